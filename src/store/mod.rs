//! Key-value state store consumed by the dedup guard.
//!
//! The only shared mutable resource between concurrent cycles. Creation must
//! be a single atomic create-if-absent so two concurrent admits for the same
//! work id cannot both succeed; eventually-consistent backends are not
//! sufficient.

mod memory;
mod sqlite;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of one unit of scheduled work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkStatus {
    Pending,
    Complete,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Pending => "PENDING",
            WorkStatus::Complete => "COMPLETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(WorkStatus::Pending),
            "COMPLETE" => Some(WorkStatus::Complete),
            _ => None,
        }
    }
}

/// Dedup record for one work id. Transitions PENDING → COMPLETE exactly once
/// per successful cycle and is never deleted — the tombstone stops redelivery
/// replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub work_id: String,
    pub status: WorkStatus,
    pub last_updated: DateTime<Utc>,
}

impl WorkRecord {
    pub fn pending(work_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            work_id: work_id.into(),
            status: WorkStatus::Pending,
            last_updated: now,
        }
    }

    pub fn complete(work_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            work_id: work_id.into(),
            status: WorkStatus::Complete,
            last_updated: now,
        }
    }
}

/// Key-value store of work records, keyed by work id.
pub trait StateStore: Send + Sync {
    fn get_if_exists(&self, work_id: &str) -> Result<Option<WorkRecord>>;

    /// Atomically create the record if no record exists for its work id.
    /// Returns true when this call created it.
    fn create_if_absent(&self, record: &WorkRecord) -> Result<bool>;

    /// Overwrite the record for its work id.
    fn update(&self, record: &WorkRecord) -> Result<()>;
}
