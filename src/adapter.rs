use crate::window::CollectionWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Source adapter interface for vendor log APIs.
///
/// An adapter turns one window/cursor into one HTTP page of raw records.
/// Adapters are stateless — all scheduling state (windows, cursors, backoff)
/// is owned by the cycle orchestrator and flows through the work queue.
///
/// # Lifecycle
/// 1. Orchestrator receives a work item with the stream's current state
/// 2. Pagination controller calls `fetch_page` until the page budget or the
///    end of the data, whichever comes first
/// 3. Raw records are formatted into log envelopes and emitted downstream
/// 4. The next window/cursor is computed and re-enqueued
///
/// # Error handling
/// `fetch_page` errors are classified by the throttle governor:
/// - rate limits → scheduled backoff or a quota-reset horizon
/// - transient errors → queue redelivery
/// - 404s → bounded retry, then stream removal
/// - auth/config errors → surfaced to the operator, no automatic retry
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique identifier of the logical data stream this adapter serves.
    fn stream_id(&self) -> &str;

    /// How the vendor API signals continuation across pages and cycles.
    fn continuation_mode(&self) -> ContinuationMode;

    /// Fetch one page of raw records for the window, resuming from `cursor`
    /// when one is present.
    async fn fetch_page(
        &self,
        window: &CollectionWindow,
        cursor: Option<&str>,
    ) -> Result<PageResult, AdapterError>;
}

/// Continuation strategy of a vendor API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContinuationMode {
    /// The API returns an opaque token; the next call passes it back verbatim
    /// and the window is ignored until the token is exhausted.
    Cursor,
    /// No cursor support: an empty page means the window is exhausted, and
    /// the next window resumes from the newest record timestamp seen.
    Window,
}

/// One page of raw records from a source adapter.
#[derive(Clone, Debug, Default)]
pub struct PageResult {
    /// Raw vendor records, unparsed beyond JSON.
    pub records: Vec<Value>,
    /// Continuation token for the next page, if the API reported more data.
    pub cursor: Option<String>,
    /// Newest record timestamp on this page, if the adapter can extract one.
    /// Window-mode streams resume from this instead of the window end.
    pub newest_record_at: Option<DateTime<Utc>>,
}

/// Error from a source adapter call.
///
/// Carries the minimum the throttle governor needs to classify the failure:
/// an HTTP-status-like code, an optional retry-after hint, and the vendor's
/// own rate-limit signal (some APIs rate-limit on 403 rather than 429).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AdapterError {
    /// HTTP status, absent for transport-level failures.
    pub status: Option<u16>,
    /// Server-provided retry hint (Retry-After or vendor equivalent).
    pub retry_after_secs: Option<u64>,
    /// True when the vendor signalled quota exhaustion.
    pub rate_limited: bool,
    pub message: String,
}

impl AdapterError {
    /// Rate-limit error, optionally with a server retry hint.
    pub fn rate_limited(retry_after_secs: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            status: Some(429),
            retry_after_secs,
            rate_limited: true,
            message: message.into(),
        }
    }

    /// Error carrying an HTTP status code.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            retry_after_secs: None,
            rate_limited: false,
            message: message.into(),
        }
    }

    /// Transport-level failure (connect, timeout, body read).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            retry_after_secs: None,
            rate_limited: false,
            message: message.into(),
        }
    }
}
