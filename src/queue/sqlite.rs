//! Durable work queue backed by SQLite.

use super::WorkQueue;
use crate::stream::WorkItem;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed delayed work queue with at-least-once delivery.
///
/// # Schema
/// ```sql
/// CREATE TABLE queue_messages (
///     id            INTEGER PRIMARY KEY,
///     stream_id     TEXT NOT NULL,
///     body          TEXT NOT NULL,     -- WorkItem JSON
///     due_at        TEXT NOT NULL,     -- ISO 8601 timestamp
///     receive_count INTEGER NOT NULL DEFAULT 0
/// );
/// ```
///
/// `dequeue_due` claims due messages by pushing `due_at` forward by the
/// visibility window — a consumer that dies without acking sees the message
/// redelivered once the window lapses. `ack` deletes the message after the
/// cycle has fully succeeded (or been skipped as a duplicate).
pub struct SqliteWorkQueue {
    conn: Mutex<Connection>,
}

/// A claimed message: queue identity plus the decoded work item.
#[derive(Clone, Debug)]
pub struct ClaimedMessage {
    pub message_id: i64,
    pub receive_count: u32,
    pub item: WorkItem,
}

impl SqliteWorkQueue {
    /// Opens (or creates) the queue database and ensures the table exists.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open work queue database")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS queue_messages (
                id            INTEGER PRIMARY KEY,
                stream_id     TEXT NOT NULL,
                body          TEXT NOT NULL,
                due_at        TEXT NOT NULL,
                receive_count INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .context("Failed to create queue_messages table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_queue_due ON queue_messages(due_at)",
            [],
        )
        .context("Failed to create due_at index")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Claim every message due at or before `now`, making each invisible for
    /// `visibility_secs`.
    pub fn dequeue_due(
        &self,
        now: DateTime<Utc>,
        visibility_secs: u64,
    ) -> Result<Vec<ClaimedMessage>> {
        let conn = self.conn.lock().unwrap();
        let redeliver_at = (now + Duration::seconds(visibility_secs as i64)).to_rfc3339();

        let mut stmt = conn
            .prepare(
                "SELECT id, body, receive_count FROM queue_messages
                 WHERE due_at <= ?1 ORDER BY due_at ASC",
            )
            .context("Failed to prepare dequeue query")?;

        let rows = stmt
            .query_map(params![now.to_rfc3339()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .context("Failed to query due messages")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read due messages")?;

        let mut claimed = Vec::with_capacity(rows.len());
        for (message_id, body, receive_count) in rows {
            conn.execute(
                "UPDATE queue_messages SET due_at = ?1, receive_count = receive_count + 1
                 WHERE id = ?2",
                params![redeliver_at, message_id],
            )
            .context("Failed to claim queue message")?;

            let item: WorkItem =
                serde_json::from_str(&body).context("Failed to decode work item body")?;
            claimed.push(ClaimedMessage {
                message_id,
                receive_count: receive_count as u32 + 1,
                item,
            });
        }

        Ok(claimed)
    }

    /// Delete a fully handled message.
    pub fn ack(&self, message_id: i64) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM queue_messages WHERE id = ?1",
                params![message_id],
            )
            .context("Failed to ack queue message")?;
        Ok(())
    }

    /// True when the stream has any message in flight or scheduled. Used to
    /// avoid double-seeding streams across daemon restarts.
    pub fn has_pending(&self, stream_id: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM queue_messages WHERE stream_id = ?1",
                params![stream_id],
                |row| row.get(0),
            )
            .context("Failed to count pending messages")?;
        Ok(count > 0)
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn enqueue(&self, item: &WorkItem, delay_secs: u64) -> Result<()> {
        let body = serde_json::to_string(item).context("Failed to encode work item")?;
        let due_at = (Utc::now() + Duration::seconds(delay_secs as i64)).to_rfc3339();

        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO queue_messages (stream_id, body, due_at) VALUES (?1, ?2, ?3)",
                params![item.state.stream_id, body, due_at],
            )
            .context("Failed to enqueue work item")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamState;

    fn in_memory_queue() -> SqliteWorkQueue {
        SqliteWorkQueue::new(":memory:").expect("Failed to create test queue")
    }

    #[tokio::test]
    async fn test_enqueue_and_dequeue() {
        let queue = in_memory_queue();
        let item = WorkItem::next(StreamState::initial("s1", 60));

        queue.enqueue(&item, 0).await.unwrap();

        let claimed = queue.dequeue_due(Utc::now(), 900).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].item.work_id, item.work_id);
        assert_eq!(claimed[0].receive_count, 1);
    }

    #[tokio::test]
    async fn test_delayed_message_not_visible_early() {
        let queue = in_memory_queue();
        let item = WorkItem::next(StreamState::initial("s1", 60));

        queue.enqueue(&item, 600).await.unwrap();

        assert!(queue.dequeue_due(Utc::now(), 900).unwrap().is_empty());

        let later = Utc::now() + Duration::seconds(601);
        assert_eq!(queue.dequeue_due(later, 900).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claimed_message_invisible_until_window_lapses() {
        let queue = in_memory_queue();
        let item = WorkItem::next(StreamState::initial("s1", 60));
        queue.enqueue(&item, 0).await.unwrap();

        let now = Utc::now();
        let first = queue.dequeue_due(now, 300).unwrap();
        assert_eq!(first.len(), 1);

        // Still claimed — nothing due
        assert!(queue.dequeue_due(now, 300).unwrap().is_empty());

        // Visibility window lapsed without an ack — redelivered
        let later = now + Duration::seconds(301);
        let redelivered = queue.dequeue_due(later, 300).unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].item.work_id, item.work_id);
        assert_eq!(redelivered[0].receive_count, 2);
    }

    #[tokio::test]
    async fn test_ack_removes_message() {
        let queue = in_memory_queue();
        let item = WorkItem::next(StreamState::initial("s1", 60));
        queue.enqueue(&item, 0).await.unwrap();

        let claimed = queue.dequeue_due(Utc::now(), 300).unwrap();
        queue.ack(claimed[0].message_id).unwrap();

        let later = Utc::now() + Duration::seconds(301);
        assert!(queue.dequeue_due(later, 300).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_has_pending_per_stream() {
        let queue = in_memory_queue();
        queue
            .enqueue(&WorkItem::next(StreamState::initial("s1", 60)), 0)
            .await
            .unwrap();

        assert!(queue.has_pending("s1").unwrap());
        assert!(!queue.has_pending("s2").unwrap());
    }

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let item = WorkItem::next(StreamState::initial("s1", 60));

        {
            let queue = SqliteWorkQueue::new(&path).unwrap();
            queue.enqueue(&item, 0).await.unwrap();
        }

        let reopened = SqliteWorkQueue::new(&path).unwrap();
        let claimed = reopened.dequeue_due(Utc::now(), 300).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].item.state.stream_id, "s1");
    }
}
