//! Cycle orchestrator.
//!
//! The top-level driver invoked once per scheduled trigger. A cycle runs
//! `Admitting → Collecting → (Succeeding | BackingOff | Failing)` and ends by
//! re-enqueueing the next cycle's work item — or, for transient failures, by
//! propagating the error so the work queue's redelivery retries it.

use crate::adapter::{AdapterError, ContinuationMode};
use crate::config::CollectorConfig;
use crate::dedup::{Admission, DedupGuard};
use crate::envelope::LogEnvelope;
use crate::pagination::{self, PageBatch};
use crate::queue::WorkQueue;
use crate::registry::StreamHandle;
use crate::sink::{self, IngestionSink};
use crate::stream::{StreamState, WorkItem};
use crate::throttle::{self, ErrorKind};
use crate::window::{next_window, CollectionWindow};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Re-enqueue delay while a continuation cursor is pending.
const RESUME_DELAY_SECS: u64 = 1;

/// Terminal result of one cycle invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleReport {
    /// Duplicate trigger dropped with no side effects.
    Skipped(Admission),
    /// Records collected and handed off; next cycle scheduled.
    Completed {
        emitted: usize,
        next_delay_secs: u64,
    },
    /// Rate limited — zero records, unchanged state rescheduled.
    Throttled { next_delay_secs: u64 },
    /// Bounded-retry failure — rescheduled with the failure count bumped.
    Deferred { next_delay_secs: u64 },
    /// Stream is gone (404 budget spent or deregistered); not rescheduled.
    StreamGone,
}

/// Operator-visible status channel for conditions the scheduler will not
/// retry silently. Reporting transport (pager, ticket, metric) is up to the
/// embedding application.
pub trait StatusHook: Send + Sync {
    /// A stream kept failing transiently past the configured threshold.
    fn persistent_failure(&self, stream_id: &str, detail: &str);
    /// A stream's 404 budget is spent; it will no longer be scheduled.
    fn stream_vanished(&self, stream_id: &str);
    /// Auth/config failure needing operator intervention.
    fn fatal(&self, stream_id: &str, detail: &str);
}

/// Default hook: structured log records only.
pub struct LogStatusHook;

impl StatusHook for LogStatusHook {
    fn persistent_failure(&self, stream_id: &str, detail: &str) {
        error!(stream_id = %stream_id, detail = %detail, "Stream failing persistently");
    }

    fn stream_vanished(&self, stream_id: &str) {
        warn!(stream_id = %stream_id, "Stream removed after exhausting not-found budget");
    }

    fn fatal(&self, stream_id: &str, detail: &str) {
        error!(stream_id = %stream_id, detail = %detail, "Fatal stream error");
    }
}

/// Per-stream collection status.
#[derive(Clone, Debug, Default)]
pub struct StreamStatus {
    /// Last successful cycle timestamp
    pub last_poll: Option<DateTime<Utc>>,
    /// Last error message (if any)
    pub last_error: Option<String>,
    /// Total number of successful cycles
    pub poll_count: u64,
    /// Total number of failed cycles
    pub error_count: u64,
    /// Total records handed to the sink
    pub records_emitted: u64,
}

/// Drives one stream cycle per work item.
///
/// Holds no per-stream mutable scheduling state — that travels through the
/// work queue. The only cross-cycle state here is bookkeeping: per-stream
/// status and the in-process transient-failure counters.
pub struct CycleOrchestrator {
    streams: HashMap<String, StreamHandle>,
    guard: DedupGuard,
    queue: Arc<dyn WorkQueue>,
    sink: Arc<dyn IngestionSink>,
    hook: Arc<dyn StatusHook>,
    config: CollectorConfig,
    /// Consecutive transient failures per stream, reset on success.
    transient_failures: DashMap<String, u32>,
    status: DashMap<String, StreamStatus>,
}

impl CycleOrchestrator {
    pub fn new(
        streams: HashMap<String, StreamHandle>,
        guard: DedupGuard,
        queue: Arc<dyn WorkQueue>,
        sink: Arc<dyn IngestionSink>,
        hook: Arc<dyn StatusHook>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            streams,
            guard,
            queue,
            sink,
            hook,
            config,
            transient_failures: DashMap::new(),
            status: DashMap::new(),
        }
    }

    /// Registered stream ids.
    pub fn stream_ids(&self) -> Vec<String> {
        self.streams.keys().cloned().collect()
    }

    /// Current status snapshot for a stream.
    pub fn status(&self, stream_id: &str) -> Option<StreamStatus> {
        self.status.get(stream_id).map(|s| s.clone())
    }

    /// Seed the first work item for a newly registered stream.
    pub async fn initialize(&self, stream_id: &str) -> Result<()> {
        let handle = self
            .streams
            .get(stream_id)
            .with_context(|| format!("Stream '{}' is not registered", stream_id))?;

        let item = WorkItem::next(StreamState::initial(stream_id, handle.poll_interval_secs));
        self.queue
            .enqueue(&item, 0)
            .await
            .context("Failed to seed initial work item")?;

        info!(stream_id = %stream_id, "Stream initialized");
        Ok(())
    }

    /// Run one cycle for one delivered work item.
    ///
    /// `Ok` means the delivery is fully handled and the caller should ack it;
    /// `Err` means the caller must leave it for queue redelivery.
    pub async fn run_cycle(&self, item: WorkItem) -> Result<CycleReport> {
        let WorkItem { work_id, state } = item;
        let stream_id = state.stream_id.clone();

        let handle = match self.streams.get(&stream_id) {
            Some(h) => h,
            None => {
                // Deregistered while work was in flight — drop the chain
                warn!(stream_id = %stream_id, "Dropping cycle for deregistered stream");
                self.guard.complete(&work_id)?;
                return Ok(CycleReport::StreamGone);
            }
        };

        match self.guard.admit(&work_id)? {
            Admission::Admitted => {}
            admission => {
                debug!(
                    stream_id = %stream_id,
                    work_id = %work_id,
                    ?admission,
                    "Dropping duplicate trigger"
                );
                return Ok(CycleReport::Skipped(admission));
            }
        }

        let now = Utc::now();

        // Quota horizon unexpired: the vendor is known-exhausted, don't call it
        if let Some(reset_at) = state.quota_reset_at {
            if reset_at > now {
                let delay = throttle::horizon_wait_secs(now, reset_at);
                info!(
                    stream_id = %stream_id,
                    reset_at = %reset_at,
                    delay_secs = delay,
                    "Quota horizon unexpired, skipping poll"
                );
                self.guard.complete(&work_id)?;
                self.queue.enqueue(&WorkItem::next(state), delay).await?;
                return Ok(CycleReport::Throttled {
                    next_delay_secs: delay,
                });
            }
        }

        let window = match state.window {
            Some(w) => w,
            None => {
                // First run (or unparseable persisted window): fresh window
                next_window(
                    None,
                    now,
                    state.poll_interval_secs,
                    handle.policy,
                    self.config.lag_margin_secs,
                )
                .window
            }
        };

        let max_pages = handle.max_pages.unwrap_or(self.config.max_pages);
        debug!(
            stream_id = %stream_id,
            since = %window.since,
            until = %window.until,
            cursor = state.cursor.as_deref().unwrap_or(""),
            "Collecting"
        );

        let collected = pagination::collect(
            handle.adapter.as_ref(),
            &window,
            state.cursor.clone(),
            max_pages,
        )
        .await;

        match collected {
            Ok(batch) => {
                self.succeed(handle, &work_id, state, window, batch, now)
                    .await
            }
            Err(err) => self.fail(&work_id, state, err, now).await,
        }
    }

    /// Succeeding: build the next state, hand off the batch, mark complete,
    /// schedule the next cycle.
    async fn succeed(
        &self,
        handle: &StreamHandle,
        work_id: &str,
        state: StreamState,
        window: CollectionWindow,
        batch: PageBatch,
        now: DateTime<Utc>,
    ) -> Result<CycleReport> {
        let stream_id = state.stream_id.clone();

        let (next_state, next_delay_secs) = if let Some(cursor) = batch.continuation.clone() {
            // Continuation pending: keep the window, adopt the cursor, resume fast
            let next = StreamState {
                stream_id: stream_id.clone(),
                window: Some(window),
                cursor: Some(cursor),
                poll_interval_secs: state.poll_interval_secs,
                quota_reset_at: None,
                consecutive_failures: 0,
            };
            (next, RESUME_DELAY_SECS)
        } else {
            // Window exhausted: advance via the window strategy. Window-mode
            // APIs resume from the newest record seen so slightly-skewed
            // vendor timestamps cannot open a gap.
            let resume_from = match handle.adapter.continuation_mode() {
                ContinuationMode::Window => batch
                    .newest_record_at
                    .map(|ts| ts.max(window.since))
                    .unwrap_or(window.until),
                ContinuationMode::Cursor => window.until,
            };
            let plan = next_window(
                Some(resume_from),
                now,
                state.poll_interval_secs,
                handle.policy,
                self.config.lag_margin_secs,
            );
            let next = StreamState {
                stream_id: stream_id.clone(),
                window: Some(plan.window),
                cursor: None,
                poll_interval_secs: state.poll_interval_secs,
                quota_reset_at: None,
                consecutive_failures: 0,
            };
            (next, plan.suggested_delay_secs)
        };

        let envelopes: Vec<LogEnvelope> = batch
            .records
            .iter()
            .map(|r| handle.formatter.format(&stream_id, r))
            .collect();

        if let Err(e) = sink::emit_chunked(self.sink.as_ref(), &envelopes).await {
            // Handoff failed — state must not advance. Redelivery re-requests
            // the same window, so nothing is lost.
            self.record_error(&stream_id, &e.to_string());
            self.note_transient(&stream_id, &e.to_string());
            return Err(anyhow::Error::new(e).context("Failed to emit batch to intake"));
        }

        // Handoff accepted: mark the unit complete before enqueueing the next
        self.guard.complete(work_id)?;
        self.queue
            .enqueue(&WorkItem::next(next_state), next_delay_secs)
            .await
            .context("Failed to enqueue next cycle")?;

        self.transient_failures.remove(&stream_id);
        {
            let mut status = self.status.entry(stream_id.clone()).or_default();
            status.last_poll = Some(now);
            status.last_error = None;
            status.poll_count += 1;
            status.records_emitted += envelopes.len() as u64;
        }

        info!(
            stream_id = %stream_id,
            emitted = envelopes.len(),
            pages = batch.pages_fetched,
            next_delay_secs = next_delay_secs,
            "Cycle complete"
        );

        Ok(CycleReport::Completed {
            emitted: envelopes.len(),
            next_delay_secs,
        })
    }

    /// BackingOff / Failing: route the classified error.
    async fn fail(
        &self,
        work_id: &str,
        state: StreamState,
        err: AdapterError,
        now: DateTime<Utc>,
    ) -> Result<CycleReport> {
        let stream_id = state.stream_id.clone();
        let classification = throttle::classify(&err);
        self.record_error(&stream_id, &err.message);

        match classification.kind {
            ErrorKind::RateLimited => {
                let plan = throttle::rate_limit_backoff(
                    now,
                    state.poll_interval_secs,
                    classification.retry_after_secs,
                    self.config.max_poll_interval_secs,
                );
                info!(
                    stream_id = %stream_id,
                    delay_secs = plan.delay_secs,
                    horizon = ?plan.quota_reset_at,
                    "Rate limited, backing off"
                );

                // State unchanged apart from the horizon; the attempt itself
                // is handled so the throttled trigger is not redelivered.
                let next_state = StreamState {
                    quota_reset_at: plan.quota_reset_at,
                    ..state
                };
                self.guard.complete(work_id)?;
                self.queue
                    .enqueue(&WorkItem::next(next_state), plan.delay_secs)
                    .await?;

                Ok(CycleReport::Throttled {
                    next_delay_secs: plan.delay_secs,
                })
            }
            ErrorKind::NotFound => {
                let failures = state.consecutive_failures + 1;
                if failures >= self.config.not_found_budget {
                    warn!(
                        stream_id = %stream_id,
                        failures = failures,
                        "Not-found budget exhausted, removing stream"
                    );
                    self.guard.complete(work_id)?;
                    self.hook.stream_vanished(&stream_id);
                    return Ok(CycleReport::StreamGone);
                }

                let delay = state.poll_interval_secs;
                let next_state = StreamState {
                    consecutive_failures: failures,
                    ..state
                };
                self.guard.complete(work_id)?;
                self.queue.enqueue(&WorkItem::next(next_state), delay).await?;

                debug!(
                    stream_id = %stream_id,
                    failures = failures,
                    "Target not found, retrying within budget"
                );
                Ok(CycleReport::Deferred {
                    next_delay_secs: delay,
                })
            }
            ErrorKind::Transient => {
                let count = self.note_transient(&stream_id, &err.message);
                if count >= self.config.persistent_failure_threshold {
                    self.hook.persistent_failure(&stream_id, &err.message);
                }
                // No complete: queue redelivery retries this exact unit
                Err(anyhow::Error::new(err)
                    .context(format!("Transient failure collecting '{}'", stream_id)))
            }
            ErrorKind::Fatal => {
                error!(
                    stream_id = %stream_id,
                    error = %err.message,
                    "Fatal collection error"
                );
                self.hook.fatal(&stream_id, &err.message);
                Err(anyhow::Error::new(err)
                    .context(format!("Fatal failure collecting '{}'", stream_id)))
            }
        }
    }

    fn note_transient(&self, stream_id: &str, _detail: &str) -> u32 {
        let mut entry = self
            .transient_failures
            .entry(stream_id.to_string())
            .or_insert(0);
        *entry += 1;
        *entry
    }

    fn record_error(&self, stream_id: &str, message: &str) {
        let mut status = self.status.entry(stream_id.to_string()).or_default();
        status.last_error = Some(message.to_string());
        status.error_count += 1;
    }
}
