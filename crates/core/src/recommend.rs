use crate::domain::recommendation::{ReasonType, RecommendationReason, RecommendedStock};
use crate::domain::stock::StockEvent;
use crate::storage::{SearchParams, StockStore};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;

/// Maximum number of recommendations returned.
pub const TOP_N: usize = 5;

/// How many of the newest events are considered.
pub const CANDIDATE_WINDOW: i64 = 500;

const POSITIVE_RATINGS: [&str; 7] = [
    "buy",
    "outperform",
    "strong buy",
    "overweight",
    "accumulate",
    "add",
    "positive",
];

const POSITIVE_RATING_POINTS: f64 = 50.0;
const TARGET_INCREASE_POINTS: f64 = 20.0;
const UPGRADE_POINTS: f64 = 30.0;
const NEW_COVERAGE_POINTS: f64 = 25.0;
const RECENT_POINTS: f64 = 15.0;
const RECENT_MONTHS: i32 = 3;

pub fn is_positive_rating(rating: &str) -> bool {
    let rating = rating.to_lowercase();
    POSITIVE_RATINGS.contains(&rating.as_str())
}

/// Events strictly after this instant earn the recency bonus.
///
/// Keeps the day of month and time of day; a day past the end of the target
/// month rolls over into the next one (May 31 gives March 3, or March 2 in a
/// leap year).
pub fn recent_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    let months = now.year() * 12 + now.month0() as i32 - RECENT_MONTHS;
    let (year, month0) = (months.div_euclid(12), months.rem_euclid(12) as u32);

    NaiveDate::from_ymd_opt(year, month0 + 1, 1)
        .and_then(|first| first.checked_add_days(Days::new(u64::from(now.day0()))))
        .map(|day| day.and_time(now.time()).and_utc())
        .unwrap_or(now)
}

/// Scores a single event. `None` means the event is not a candidate.
pub fn score_event(event: &StockEvent, cutoff: DateTime<Utc>) -> Option<RecommendedStock> {
    // Everything below assumes a positive rating.
    if !is_positive_rating(&event.rating_to) {
        return None;
    }

    let mut score = POSITIVE_RATING_POINTS;
    let mut reasons = vec![RecommendationReason {
        kind: ReasonType::PositiveRating,
        details: format!("Rating positivo: {}", event.rating_to),
    }];

    if let Some(target_to) = event.target_to {
        score += target_to.to_f64().unwrap_or(0.0) / 10.0;
        match event.target_from {
            Some(target_from) if target_to > target_from => {
                score += TARGET_INCREASE_POINTS;
                reasons.push(RecommendationReason {
                    kind: ReasonType::TargetIncreased,
                    details: format!(
                        "Precio objetivo aumentado de ${target_from:.2} a ${target_to:.2}"
                    ),
                });
            }
            _ => reasons.push(RecommendationReason {
                kind: ReasonType::TargetAttractive,
                details: format!("Precio objetivo atractivo: ${target_to:.2}"),
            }),
        }
    }

    let action = event.action.to_lowercase();
    if action.contains("upgraded by") {
        score += UPGRADE_POINTS;
        reasons.push(RecommendationReason {
            kind: ReasonType::BrokerUpgrade,
            details: format!("Mejorada por {}", event.brokerage),
        });
    }

    if action.contains("initiated by") {
        score += NEW_COVERAGE_POINTS;
        reasons.push(RecommendationReason {
            kind: ReasonType::NewPositiveCoverage,
            details: format!(
                "Nueva cobertura ({}) iniciada con rating positivo: {}",
                event.brokerage, event.rating_to
            ),
        });
    }

    if event.time > cutoff {
        score += RECENT_POINTS;
        reasons.push(RecommendationReason {
            kind: ReasonType::RecentEvent,
            details: "Evento de rating reciente (últimos 3 meses).".to_string(),
        });
    }

    (score > POSITIVE_RATING_POINTS).then(|| RecommendedStock {
        stock: event.clone(),
        reasons,
        score,
    })
}

/// Scores `events` against `now` and keeps the best [`TOP_N`], highest score first.
/// Equal scores keep their input order.
pub fn rank(events: &[StockEvent], now: DateTime<Utc>) -> Vec<RecommendedStock> {
    let cutoff = recent_cutoff(now);
    let mut candidates: Vec<RecommendedStock> = events
        .iter()
        .filter_map(|e| score_event(e, cutoff))
        .collect();

    tracing::debug!(
        analyzed = events.len(),
        candidates = candidates.len(),
        "scored stock events"
    );

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(TOP_N);
    candidates
}

/// Ranks the newest [`CANDIDATE_WINDOW`] events in `store`. Store errors are returned as-is.
pub async fn recommend<S>(store: &S, now: DateTime<Utc>) -> anyhow::Result<Vec<RecommendedStock>>
where
    S: StockStore + ?Sized,
{
    let (events, _) = store.search(&SearchParams::latest(CANDIDATE_WINDOW)).await?;
    let out = rank(&events, now);
    tracing::info!(
        analyzed = events.len(),
        returned = out.len(),
        "computed recommendations"
    );
    Ok(out)
}
