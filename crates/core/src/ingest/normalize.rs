use crate::domain::stock::{zero_instant, NewStockEvent};
use crate::ingest::types::RawItem;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[error("cannot parse monetary value '{raw}': {source}")]
pub struct MonetaryParseError {
    pub raw: String,
    #[source]
    pub source: rust_decimal::Error,
}

/// Parses upstream prices such as "$1,234.50". Blank input is `Ok(None)`.
pub fn parse_monetary_value(raw: &str) -> Result<Option<Decimal>, MonetaryParseError> {
    let cleaned = raw.replace(['$', ','], "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(None);
    }

    let value = Decimal::from_str(cleaned).map_err(|source| MonetaryParseError {
        raw: raw.to_string(),
        source,
    })?;
    // Stored as NUMERIC(10,2); Postgres rounds half away from zero.
    Ok(Some(value.round_dp_with_strategy(
        2,
        RoundingStrategy::MidpointAwayFromZero,
    )))
}

/// RFC3339 timestamp with optional fractional seconds, converted to UTC.
pub fn parse_event_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw.trim()).map(|dt| dt.with_timezone(&Utc))
}

/// Maps an upstream item onto a storable event.
///
/// Field-level problems never drop the row: unparsable prices become absent and
/// an unparsable time becomes [`zero_instant`], each with a warning.
pub fn normalize_item(item: &RawItem) -> NewStockEvent {
    let ticker = item.ticker.trim().to_string();

    let target_from = monetary_or_absent(&ticker, "target_from", &item.target_from);
    let target_to = monetary_or_absent(&ticker, "target_to", &item.target_to);

    let rating_from = Some(item.rating_from.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let time = if item.time.trim().is_empty() {
        zero_instant()
    } else {
        match parse_event_time(&item.time) {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(
                    %ticker,
                    raw_time = %item.time,
                    error = %err,
                    "unparsable event time; storing zero instant"
                );
                zero_instant()
            }
        }
    };

    NewStockEvent {
        company: item.company.trim().to_string(),
        brokerage: item.brokerage.trim().to_string(),
        action: item.action.trim().to_string(),
        rating_to: item.rating_to.trim().to_string(),
        rating_from,
        target_to,
        target_from,
        time,
        ticker,
    }
}

fn monetary_or_absent(ticker: &str, field: &'static str, raw: &str) -> Option<Decimal> {
    match parse_monetary_value(raw) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(%ticker, field, error = %err, "unparsable price; storing as absent");
            None
        }
    }
}
