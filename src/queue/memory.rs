use super::WorkQueue;
use crate::stream::WorkItem;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// In-memory work queue for tests and single-process runs.
///
/// Records every enqueued item with its delay so tests can assert on the
/// scheduling decisions a cycle made, and hands due items back for chaining
/// cycles without a real queue service.
#[derive(Default)]
pub struct MemoryWorkQueue {
    entries: Mutex<Vec<QueueEntry>>,
}

#[derive(Clone, Debug)]
pub struct QueueEntry {
    pub item: WorkItem,
    pub delay_secs: u64,
    pub due_at: DateTime<Utc>,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the next item due at or before `now`.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Option<WorkItem> {
        let mut entries = self.entries.lock().unwrap();
        let idx = entries.iter().position(|e| e.due_at <= now)?;
        Some(entries.remove(idx).item)
    }

    /// Snapshot of everything currently enqueued, in enqueue order.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, item: &WorkItem, delay_secs: u64) -> Result<()> {
        let now = Utc::now();
        self.entries.lock().unwrap().push(QueueEntry {
            item: item.clone(),
            delay_secs,
            due_at: now + Duration::seconds(delay_secs as i64),
        });
        Ok(())
    }
}
