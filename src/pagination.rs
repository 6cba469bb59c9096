//! Pagination controller.
//!
//! Drives repeated `fetch_page` calls for a single cycle, bounded by a page
//! budget so one invocation never exceeds the host's execution-time limit.
//! The recursive continue-until-done pattern common in vendor connectors is
//! expressed here as one bounded loop with an accumulator.

use crate::adapter::{AdapterError, SourceAdapter};
use crate::window::CollectionWindow;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Accumulated result of one cycle's pagination.
#[derive(Clone, Debug)]
pub struct PageBatch {
    pub records: Vec<Value>,
    /// `Some` only when the page budget stopped the loop while the adapter
    /// still reported more data; the next cycle resumes from it.
    pub continuation: Option<String>,
    /// Newest record timestamp across all fetched pages.
    pub newest_record_at: Option<DateTime<Utc>>,
    pub pages_fetched: u32,
}

/// Pull up to `max_pages` pages from the adapter.
///
/// Stops early and returns the last-seen cursor when the budget is reached;
/// stops with no continuation on an empty page or a missing token. An adapter
/// error aborts the whole cycle — accumulated records are discarded so a
/// cycle either fully succeeds or fully fails, never persisting a cursor
/// without having emitted the matching records.
pub async fn collect(
    adapter: &dyn SourceAdapter,
    window: &CollectionWindow,
    initial_cursor: Option<String>,
    max_pages: u32,
) -> Result<PageBatch, AdapterError> {
    let max_pages = max_pages.max(1);
    let mut records: Vec<Value> = Vec::new();
    let mut newest_record_at: Option<DateTime<Utc>> = None;
    let mut cursor = initial_cursor;
    let mut pages_fetched = 0u32;

    loop {
        let page = adapter.fetch_page(window, cursor.as_deref()).await?;
        pages_fetched += 1;

        let page_was_empty = page.records.is_empty();
        records.extend(page.records);
        if let Some(ts) = page.newest_record_at {
            newest_record_at = Some(match newest_record_at {
                Some(prev) => prev.max(ts),
                None => ts,
            });
        }

        let exhausted = page_was_empty || page.cursor.is_none();
        cursor = page.cursor;

        if exhausted {
            debug!(
                stream_id = %adapter.stream_id(),
                pages = pages_fetched,
                records = records.len(),
                "Pagination exhausted"
            );
            return Ok(PageBatch {
                records,
                continuation: None,
                newest_record_at,
                pages_fetched,
            });
        }

        if pages_fetched >= max_pages {
            debug!(
                stream_id = %adapter.stream_id(),
                pages = pages_fetched,
                records = records.len(),
                "Page budget reached, yielding with continuation"
            );
            return Ok(PageBatch {
                records,
                continuation: cursor,
                newest_record_at,
                pages_fetched,
            });
        }
    }
}
