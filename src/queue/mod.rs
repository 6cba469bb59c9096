//! Durable work queue consumed by the scheduler.
//!
//! At-least-once delivery with a configurable visibility delay; no ordering
//! guarantee. The scheduler assumes redelivery *will* happen — the dedup
//! guard, not the queue, is what prevents double processing.

mod memory;
mod sqlite;

pub use memory::MemoryWorkQueue;
pub use sqlite::SqliteWorkQueue;

use crate::stream::WorkItem;
use anyhow::Result;
use async_trait::async_trait;

/// Producer side of the durable work queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a work item, visible to consumers after `delay_secs`.
    async fn enqueue(&self, item: &WorkItem, delay_secs: u64) -> Result<()>;
}
