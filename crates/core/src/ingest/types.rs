use serde::{Deserialize, Deserializer, Serialize};

/// One page of the upstream ratings feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<RawItem>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// Upstream item; every field is a string on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ticker: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target_from: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target_to: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub company: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub brokerage: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rating_from: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rating_to: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
