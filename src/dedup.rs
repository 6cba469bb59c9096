//! Dedup guard.
//!
//! The work queue delivers at least once, so every invocation is treated as
//! possibly-a-duplicate. Before a cycle runs, the guard claims its work id in
//! the state store; after the batch is durably handed off, it marks the id
//! complete. Completed ids are tombstones — a redelivered message for one is
//! silently dropped.

use crate::store::{StateStore, WorkRecord, WorkStatus};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// This invocation owns the work unit and must process it.
    Admitted,
    /// The unit was already fully handled — skip without side effects.
    AlreadyComplete,
    /// Another invocation holds a live claim — abort without side effects.
    InProgressElsewhere,
}

/// Claims and releases work units against the state store.
pub struct DedupGuard {
    store: Arc<dyn StateStore>,
    /// Age beyond which a PENDING claim is considered abandoned. Must exceed
    /// the host's hard execution-time limit, or a slow-but-alive cycle could
    /// be double-claimed.
    liveness_threshold: Duration,
}

impl DedupGuard {
    pub fn new(store: Arc<dyn StateStore>, liveness_threshold_secs: u64) -> Self {
        Self {
            store,
            liveness_threshold: Duration::seconds(liveness_threshold_secs as i64),
        }
    }

    /// Try to claim `work_id` for this invocation.
    ///
    /// A PENDING claim older than the liveness threshold belongs to a cycle
    /// that died past the execution-time limit; it is reclaimed so the stream
    /// makes forward progress.
    pub fn admit(&self, work_id: &str) -> Result<Admission> {
        self.admit_at(work_id, Utc::now())
    }

    fn admit_at(&self, work_id: &str, now: DateTime<Utc>) -> Result<Admission> {
        match self.store.get_if_exists(work_id)? {
            None => {
                if self.store.create_if_absent(&WorkRecord::pending(work_id, now))? {
                    Ok(Admission::Admitted)
                } else {
                    // Lost the creation race to a concurrent invocation
                    Ok(Admission::InProgressElsewhere)
                }
            }
            Some(record) => match record.status {
                WorkStatus::Complete => Ok(Admission::AlreadyComplete),
                WorkStatus::Pending => {
                    if now - record.last_updated <= self.liveness_threshold {
                        Ok(Admission::InProgressElsewhere)
                    } else {
                        warn!(
                            work_id = %work_id,
                            claimed_at = %record.last_updated,
                            "Reclaiming abandoned work claim"
                        );
                        self.store.update(&WorkRecord::pending(work_id, now))?;
                        Ok(Admission::Admitted)
                    }
                }
            },
        }
    }

    /// Mark `work_id` fully handled. Called exactly once per successful
    /// cycle, after the sink accepted the batch and before the next cycle is
    /// enqueued.
    pub fn complete(&self, work_id: &str) -> Result<()> {
        self.store
            .update(&WorkRecord::complete(work_id, Utc::now()))
    }
}
