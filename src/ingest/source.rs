//! Remote sources: page fetching with retry and pagination.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::SourceConfig;
use crate::error::{FetchError, IngestError};

/// Hard stop for sources that keep reporting more pages.
const MAX_PAGES: u32 = 5_000;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// One GET returning a JSON document.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Value, FetchError>;
}

/// Blocking HTTP fetcher over a shared `ureq` agent.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_timeout(HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("forgewright/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        match self.agent.get(url).call() {
            Ok(response) => response.into_json().map_err(|err| FetchError::Body {
                url: url.to_string(),
                reason: err.to_string(),
            }),
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            Err(err) => Err(FetchError::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}

/// Attempts per page and the backoff between them (doubling from `base_delay`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(sources: &SourceConfig) -> Self {
        Self {
            attempts: sources.retry_attempts.max(1),
            base_delay: Duration::from_millis(sources.retry_base_delay_ms),
        }
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Fetch `url`, retrying transport and status failures per `policy`.
pub fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    policy: &RetryPolicy,
    source_name: &str,
    cancel: &CancelToken,
) -> Result<Value, IngestError> {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        match fetcher.fetch(url) {
            Ok(body) => return Ok(body),
            Err(err) => {
                warn!(source = source_name, attempt, attempts, error = %err, "page fetch failed");
                last_error = Some(err);
                if attempt < attempts {
                    thread::sleep(policy.delay_after(attempt));
                }
            }
        }
    }
    Err(IngestError::SourceUnavailable {
        source_name: source_name.to_string(),
        reason: last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempts made".to_string()),
    })
}

/// All records of a paginated source whose pages look like `{ pageCount, data: [...] }`.
///
/// Stops at `page > pageCount`, on an empty `data`, on a page whose ids are all known, or on an
/// id-less page identical to the one before.
/// Cancellation is checked between pages.
pub fn fetch_pages(
    fetcher: &dyn PageFetcher,
    url_template: &str,
    policy: &RetryPolicy,
    source_name: &str,
    cancel: &CancelToken,
) -> Result<Vec<Value>, IngestError> {
    let mut records = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut previous_page: Option<Vec<Value>> = None;
    let mut page = 1u32;

    loop {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        let url = url_template.replace("{page}", &page.to_string());
        let body = fetch_with_retry(fetcher, &url, policy, source_name, cancel)?;

        let data = body
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| IngestError::SchemaMismatch {
                source_name: source_name.to_string(),
                reason: format!("page {page} has no `data` array"),
            })?;
        if data.is_empty() {
            debug!(source = source_name, page, "empty page, stopping");
            break;
        }

        let mut ids_on_page = 0usize;
        let mut new_ids = 0usize;
        for record in data {
            if let Some(id) = record_id(record) {
                ids_on_page += 1;
                if seen_ids.insert(id) {
                    new_ids += 1;
                }
            }
        }
        if ids_on_page > 0 && new_ids == 0 {
            debug!(source = source_name, page, "page repeats known ids, stopping");
            break;
        }
        // Records without ids can only be checked against the page before.
        if ids_on_page == 0 && previous_page.as_ref() == Some(data) {
            debug!(source = source_name, page, "page repeats the previous one, stopping");
            break;
        }
        records.extend(data.iter().cloned());
        previous_page = Some(data.clone());

        let page_count = body.get("pageCount").and_then(Value::as_u64);
        debug!(source = source_name, page, records = data.len(), ?page_count, "page fetched");
        page += 1;
        if page_count.is_some_and(|count| u64::from(page) > count) || page > MAX_PAGES {
            break;
        }
    }

    info!(source = source_name, last_page = page, records = records.len(), "source fetched");
    Ok(records)
}

fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
