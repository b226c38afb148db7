use crate::domain::stock::{NewStockEvent, StockEvent};
use anyhow::Context;

pub mod memory;
pub mod pg;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

pub async fn ping(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("database ping failed")?;
    Ok(())
}

/// Capabilities the rest of the crate needs from the `stocks` table.
///
/// Reads never return soft-deleted rows. Implementations must be safe to share
/// across concurrently served requests.
#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    /// Filtered, ordered, paginated listing plus the match count before pagination.
    async fn search(&self, params: &SearchParams) -> anyhow::Result<(Vec<StockEvent>, i64)>;

    /// Case-insensitive ticker lookup. A missing ticker is `Ok(None)`.
    async fn get_by_ticker(&self, ticker: &str) -> anyhow::Result<Option<StockEvent>>;

    async fn count(&self) -> anyhow::Result<i64>;

    /// Up to `limit` events, newest first; `limit <= 0` returns everything.
    async fn recent(&self, limit: i64) -> anyhow::Result<Vec<StockEvent>>;

    /// Persists one event and returns its surrogate id.
    async fn insert(&self, event: &NewStockEvent) -> anyhow::Result<i64>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    /// 1-based; values <= 0 mean "unset".
    pub page: i64,
    /// Values <= 0 mean "unset".
    pub page_size: i64,
}

impl SearchParams {
    /// First `page_size` events ordered newest first.
    pub fn latest(page_size: i64) -> Self {
        Self {
            search: None,
            sort_by: Some("time".to_string()),
            sort_order: Some("desc".to_string()),
            page: 1,
            page_size,
        }
    }

    /// Lowercased search needle, if any.
    pub fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn ordering(&self) -> (SortColumn, SortDirection) {
        match self.sort_by.as_deref().and_then(SortColumn::parse) {
            Some(column) => (column, SortDirection::parse(self.sort_order.as_deref())),
            None => (SortColumn::Time, SortDirection::Desc),
        }
    }

    /// `(limit, offset)` to apply, or `None` to return every match.
    pub fn window(&self) -> Option<(i64, i64)> {
        if self.page_size <= 0 {
            return None;
        }
        let offset = if self.page > 0 {
            (self.page - 1).saturating_mul(self.page_size)
        } else {
            0
        };
        Some((self.page_size, offset))
    }
}

/// Columns a listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Ticker,
    Company,
    Brokerage,
    RatingTo,
    Time,
}

impl SortColumn {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ticker" => Some(Self::Ticker),
            "company" => Some(Self::Company),
            "brokerage" => Some(Self::Brokerage),
            "rating_to" => Some(Self::RatingTo),
            "time" => Some(Self::Time),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Company => "company",
            Self::Brokerage => "brokerage",
            Self::RatingTo => "rating_to",
            Self::Time => "time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Anything other than "desc" (case-insensitive) sorts ascending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("desc") => Self::Desc,
            _ => Self::Asc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}
