use crate::domain::stock::StockEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonType {
    PositiveRating,
    TargetIncreased,
    TargetAttractive,
    BrokerUpgrade,
    NewPositiveCoverage,
    RecentEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationReason {
    #[serde(rename = "type")]
    pub kind: ReasonType,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedStock {
    #[serde(flatten)]
    pub stock: StockEvent,
    pub reasons: Vec<RecommendationReason>,
    pub score: f64,
}

impl RecommendedStock {
    pub fn reason_kinds(&self) -> Vec<ReasonType> {
        self.reasons.iter().map(|r| r.kind).collect()
    }
}
