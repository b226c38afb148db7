use crate::domain::stock::{NewStockEvent, StockEvent};
use crate::storage::{SearchParams, SortColumn, SortDirection, StockStore};
use chrono::Utc;
use std::cmp::Ordering;
use tokio::sync::RwLock;

/// Process-local store with the same query semantics as the Postgres adapter.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    rows: RwLock<Vec<StockEvent>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `events`, ids assigned in order starting at 1.
    pub fn with_events(events: impl IntoIterator<Item = NewStockEvent>) -> Self {
        let now = Utc::now();
        let rows = events
            .into_iter()
            .enumerate()
            .map(|(idx, e)| e.into_stored(idx as i64 + 1, now))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }
}

#[async_trait::async_trait]
impl StockStore for InMemoryStockStore {
    async fn search(&self, params: &SearchParams) -> anyhow::Result<(Vec<StockEvent>, i64)> {
        let rows = self.rows.read().await;
        let needle = params.needle();

        let mut matched: Vec<StockEvent> = rows
            .iter()
            .filter(|e| match needle.as_deref() {
                Some(n) => {
                    e.ticker.to_lowercase().contains(n) || e.company.to_lowercase().contains(n)
                }
                None => true,
            })
            .cloned()
            .collect();
        let total = matched.len() as i64;

        let (column, direction) = params.ordering();
        matched.sort_by(|a, b| {
            let primary = compare_by(column, a, b);
            let primary = match direction {
                SortDirection::Asc => primary,
                SortDirection::Desc => primary.reverse(),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let page = match params.window() {
            Some((limit, offset)) => matched
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit as usize)
                .collect(),
            None => matched,
        };

        Ok((page, total))
    }

    async fn get_by_ticker(&self, ticker: &str) -> anyhow::Result<Option<StockEvent>> {
        let wanted = ticker.to_uppercase();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|e| e.ticker.to_uppercase() == wanted)
            .min_by_key(|e| e.id)
            .cloned())
    }

    async fn count(&self) -> anyhow::Result<i64> {
        Ok(self.rows.read().await.len() as i64)
    }

    async fn recent(&self, limit: i64) -> anyhow::Result<Vec<StockEvent>> {
        let mut rows = self.rows.read().await.clone();
        rows.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| a.id.cmp(&b.id)));
        if limit > 0 {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn insert(&self, event: &NewStockEvent) -> anyhow::Result<i64> {
        let mut rows = self.rows.write().await;
        let id = rows.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        rows.push(event.clone().into_stored(id, Utc::now()));
        Ok(id)
    }
}

fn compare_by(column: SortColumn, a: &StockEvent, b: &StockEvent) -> Ordering {
    match column {
        SortColumn::Ticker => a.ticker.cmp(&b.ticker),
        SortColumn::Company => a.company.cmp(&b.company),
        SortColumn::Brokerage => a.brokerage.cmp(&b.brokerage),
        SortColumn::RatingTo => a.rating_to.cmp(&b.rating_to),
        SortColumn::Time => a.time.cmp(&b.time),
    }
}
