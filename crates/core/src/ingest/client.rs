use crate::config::Settings;
use crate::ingest::types::PageResponse;
use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Why a page could not be obtained. The pipeline decides retry vs. abort from the variant.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("stock API request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("stock API HTTP {status} (retryable): {body}")]
    Retryable { status: StatusCode, body: String },

    #[error("stock API HTTP {status} is not recoverable: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("failed to read stock API response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("stock API response is not a valid page: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A paginated feed of analyst rating events.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches the page addressed by `next_page`, or the first page when `None`.
    async fn fetch_page(&self, next_page: Option<&str>) -> Result<PageResponse, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpStockApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpStockApiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build stock API http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let token = settings.require_stock_api_token()?;

        let timeout_secs = std::env::var("STOCK_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(
            settings.stock_api_base_url(),
            token,
            Duration::from_secs(timeout_secs),
        )
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl PageSource for HttpStockApiClient {
    async fn fetch_page(&self, next_page: Option<&str>) -> Result<PageResponse, FetchError> {
        let mut req = self
            .http
            .get(&self.base_url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json");
        if let Some(token) = next_page {
            req = req.query(&[("next_page", token)]);
        }

        let res = req
            .send()
            .await
            .map_err(|err| FetchError::Transport(Box::new(err)))?;

        let status = res.status();
        if status != StatusCode::OK {
            let body = res.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                return Err(FetchError::Retryable { status, body });
            }
            return Err(FetchError::Rejected { status, body });
        }

        let text = res.text().await.map_err(FetchError::Body)?;
        Ok(serde_json::from_str::<PageResponse>(&text)?)
    }
}
