use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One analyst action on a ticker at a point in time, as stored.
///
/// Surrogate id and bookkeeping timestamps keep the field names the web client
/// already consumes (`ID`, `CreatedAt`, `UpdatedAt`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEvent {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "UpdatedAt")]
    pub updated_at: DateTime<Utc>,
    pub ticker: String,
    pub company: String,
    pub brokerage: String,
    pub action: String,
    pub rating_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_to: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_from: Option<Decimal>,
    pub time: DateTime<Utc>,
}

/// A normalized event ready to be persisted; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStockEvent {
    pub ticker: String,
    pub company: String,
    pub brokerage: String,
    pub action: String,
    pub rating_to: String,
    pub rating_from: Option<String>,
    pub target_to: Option<Decimal>,
    pub target_from: Option<Decimal>,
    pub time: DateTime<Utc>,
}

impl NewStockEvent {
    pub fn into_stored(self, id: i64, created_at: DateTime<Utc>) -> StockEvent {
        StockEvent {
            id,
            created_at,
            updated_at: created_at,
            ticker: self.ticker,
            company: self.company,
            brokerage: self.brokerage,
            action: self.action,
            rating_to: self.rating_to,
            rating_from: self.rating_from,
            target_to: self.target_to,
            target_from: self.target_from,
            time: self.time,
        }
    }
}

/// Placeholder instant for events whose upstream timestamp is missing or unreadable.
pub fn zero_instant() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
