//! Durable state store backed by SQLite.

use super::{StateStore, WorkRecord, WorkStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed work-record store.
///
/// # Schema
/// ```sql
/// CREATE TABLE work_records (
///     work_id      TEXT PRIMARY KEY,
///     status       TEXT NOT NULL,     -- PENDING | COMPLETE
///     last_updated TEXT NOT NULL      -- ISO 8601 timestamp
/// );
/// ```
///
/// `INSERT OR IGNORE` against the primary key gives atomic create-if-absent;
/// SQLite's serialized mode makes concurrent admits safe.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Opens (or creates) the store and ensures the table exists.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open state store database")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS work_records (
                work_id      TEXT PRIMARY KEY,
                status       TEXT NOT NULL,
                last_updated TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create work_records table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl StateStore for SqliteStateStore {
    fn get_if_exists(&self, work_id: &str) -> Result<Option<WorkRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT work_id, status, last_updated FROM work_records WHERE work_id = ?1")
            .context("Failed to prepare work record query")?;

        let mut rows = stmt
            .query(params![work_id])
            .context("Failed to query work record")?;

        if let Some(row) = rows.next().context("Failed to read work record row")? {
            let work_id: String = row.get(0)?;
            let status_str: String = row.get(1)?;
            let last_updated_str: String = row.get(2)?;

            let status = WorkStatus::parse(&status_str)
                .with_context(|| format!("Unknown work status '{}'", status_str))?;
            let last_updated: DateTime<Utc> = last_updated_str
                .parse()
                .context("Failed to parse last_updated timestamp")?;

            Ok(Some(WorkRecord {
                work_id,
                status,
                last_updated,
            }))
        } else {
            Ok(None)
        }
    }

    fn create_if_absent(&self, record: &WorkRecord) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT OR IGNORE INTO work_records (work_id, status, last_updated)
                 VALUES (?1, ?2, ?3)",
                params![
                    record.work_id,
                    record.status.as_str(),
                    record.last_updated.to_rfc3339(),
                ],
            )
            .context("Failed to create work record")?;

        Ok(changed == 1)
    }

    fn update(&self, record: &WorkRecord) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO work_records (work_id, status, last_updated)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(work_id) DO UPDATE SET
                    status = excluded.status,
                    last_updated = excluded.last_updated",
                params![
                    record.work_id,
                    record.status.as_str(),
                    record.last_updated.to_rfc3339(),
                ],
            )
            .context("Failed to update work record")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory_store() -> SqliteStateStore {
        SqliteStateStore::new(":memory:").expect("Failed to create test store")
    }

    #[test]
    fn test_create_and_get() {
        let store = in_memory_store();
        let record = WorkRecord::pending("w1", Utc::now());

        assert!(store.create_if_absent(&record).unwrap());

        let fetched = store.get_if_exists("w1").unwrap().unwrap();
        assert_eq!(fetched.work_id, "w1");
        assert_eq!(fetched.status, WorkStatus::Pending);
    }

    #[test]
    fn test_create_if_absent_returns_false_on_existing() {
        let store = in_memory_store();
        let record = WorkRecord::pending("w1", Utc::now());

        assert!(store.create_if_absent(&record).unwrap());
        assert!(!store.create_if_absent(&record).unwrap());

        // The original record is untouched
        let fetched = store.get_if_exists("w1").unwrap().unwrap();
        assert_eq!(fetched.status, WorkStatus::Pending);
    }

    #[test]
    fn test_get_nonexistent() {
        let store = in_memory_store();
        assert!(store.get_if_exists("ghost").unwrap().is_none());
    }

    #[test]
    fn test_update_transitions_status() {
        let store = in_memory_store();
        let now = Utc::now();
        store
            .create_if_absent(&WorkRecord::pending("w1", now))
            .unwrap();

        store.update(&WorkRecord::complete("w1", now)).unwrap();

        let fetched = store.get_if_exists("w1").unwrap().unwrap();
        assert_eq!(fetched.status, WorkStatus::Complete);
    }

    #[test]
    fn test_timestamps_round_trip() {
        let store = in_memory_store();
        let now = Utc::now();
        store
            .create_if_absent(&WorkRecord::pending("w1", now))
            .unwrap();

        let fetched = store.get_if_exists("w1").unwrap().unwrap();
        // RFC 3339 keeps sub-second precision
        assert_eq!(fetched.last_updated, now);
    }

    #[test]
    fn test_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let now = Utc::now();

        {
            let store = SqliteStateStore::new(&path).unwrap();
            store
                .create_if_absent(&WorkRecord::complete("w1", now))
                .unwrap();
        }

        let reopened = SqliteStateStore::new(&path).unwrap();
        let fetched = reopened.get_if_exists("w1").unwrap().unwrap();
        assert_eq!(fetched.status, WorkStatus::Complete);
    }
}
