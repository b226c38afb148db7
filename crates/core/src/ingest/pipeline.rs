use crate::ingest::client::{FetchError, PageSource};
use crate::ingest::normalize::normalize_item;
use crate::ingest::types::PageResponse;
use crate::storage::StockStore;
use anyhow::Context;
use std::time::Duration;

const DEFAULT_TRANSPORT_RETRY_SECS: u64 = 10;
const DEFAULT_THROTTLE_RETRY_SECS: u64 = 20;

/// Fixed waits before re-requesting a page. Retries are unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait after a connection/timeout failure.
    pub transport_delay: Duration,
    /// Wait after HTTP 429 or any 5xx.
    pub throttle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transport_delay: Duration::from_secs(DEFAULT_TRANSPORT_RETRY_SECS),
            throttle_delay: Duration::from_secs(DEFAULT_THROTTLE_RETRY_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(secs) = env_secs("INGEST_TRANSPORT_RETRY_SECS") {
            out.transport_delay = secs;
        }

        if let Some(secs) = env_secs("INGEST_THROTTLE_RETRY_SECS") {
            out.throttle_delay = secs;
        }

        out
    }

    /// Delay before retrying after `err`, or `None` when the run must stop.
    pub fn delay_for(&self, err: &FetchError) -> Option<Duration> {
        match err {
            FetchError::Transport(_) => Some(self.transport_delay),
            FetchError::Retryable { .. } => Some(self.throttle_delay),
            FetchError::Rejected { .. } | FetchError::Body(_) | FetchError::Decode(_) => None,
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulationReport {
    /// True when the store already held events and nothing was fetched.
    pub skipped: bool,
    pub pages: u32,
    pub items_seen: usize,
    pub persisted: usize,
    pub failed: usize,
}

/// Populates an empty store from `source`; a store that already has rows is left alone.
pub async fn bootstrap<S, W>(
    source: &S,
    store: &W,
    policy: &RetryPolicy,
) -> anyhow::Result<PopulationReport>
where
    S: PageSource + ?Sized,
    W: StockStore + ?Sized,
{
    let existing = store
        .count()
        .await
        .context("count stocks before population failed")?;
    if existing > 0 {
        tracing::info!(existing, "store already populated; skipping ingestion");
        return Ok(PopulationReport {
            skipped: true,
            ..Default::default()
        });
    }

    tracing::info!("store is empty; starting ingestion");
    populate(source, store, policy).await
}

/// Walks every page of `source` in order, persisting each item as it arrives.
///
/// Rows that fail to persist are logged and skipped. Continuation tokens are
/// not checkpointed, so an aborted run has to start over on an empty store.
pub async fn populate<S, W>(
    source: &S,
    store: &W,
    policy: &RetryPolicy,
) -> anyhow::Result<PopulationReport>
where
    S: PageSource + ?Sized,
    W: StockStore + ?Sized,
{
    let mut report = PopulationReport::default();
    let mut continuation: Option<String> = None;
    let mut page_no: u32 = 1;

    loop {
        let page = fetch_with_retry(source, continuation.as_deref(), page_no, policy).await?;
        report.pages = page_no;

        let next = page
            .next_page
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if page.items.is_empty() && next.is_none() {
            tracing::info!(page = page_no, "empty page without continuation; end of data");
            break;
        }

        for raw in &page.items {
            report.items_seen += 1;
            let event = normalize_item(raw);
            match store.insert(&event).await {
                Ok(_) => report.persisted += 1,
                Err(err) => {
                    report.failed += 1;
                    let detail = format!("{err:#}");
                    tracing::warn!(
                        page = page_no,
                        ticker = %event.ticker,
                        error = %detail,
                        "failed to persist stock event; skipping"
                    );
                }
            }
        }

        tracing::info!(
            page = page_no,
            items = page.items.len(),
            persisted = report.persisted,
            failed = report.failed,
            "stock API page processed"
        );

        match next {
            Some(token) => {
                tracing::debug!(page = page_no, next_page = %token, "following continuation token");
                continuation = Some(token);
                page_no += 1;
            }
            None => break,
        }
    }

    tracing::info!(
        pages = report.pages,
        items_seen = report.items_seen,
        persisted = report.persisted,
        failed = report.failed,
        "ingestion finished"
    );
    Ok(report)
}

async fn fetch_with_retry<S>(
    source: &S,
    next_page: Option<&str>,
    page_no: u32,
    policy: &RetryPolicy,
) -> anyhow::Result<PageResponse>
where
    S: PageSource + ?Sized,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match source.fetch_page(next_page).await {
            Ok(page) => return Ok(page),
            Err(err) => match policy.delay_for(&err) {
                Some(backoff) => {
                    tracing::warn!(
                        page = page_no,
                        attempt,
                        ?backoff,
                        error = %err,
                        "stock API fetch failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                None => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("stock API page {page_no} failed")));
                }
            },
        }
    }
}
