//! Trawler - Adaptive collection scheduler for third-party log APIs.
//!
//! Trawler polls vendor log/event APIs on a recurring schedule, normalizes
//! their records into a log envelope, and hands batches to a downstream
//! intake, while respecting each API's pagination model, rate limits, and
//! the bounded execution time of the runtime driving it.
//!
//! # Architecture
//!
//! ```text
//! Durable Work Queue (at-least-once delivery)
//!          ↓ work item (stream state + dedup id)
//! ┌─────────────────────────────────────────┐
//! │           Cycle Orchestrator             │
//! │  - Dedup guard (admit / complete)        │
//! │  - Pagination controller (page budget)   │
//! │  - Window strategy (catch-up policies)   │
//! │  - Throttle governor (backoff, quotas)   │
//! └─────────────────────────────────────────┘
//!     ↓ formatted batch            ↓ next work item
//! Ingestion Sink            Durable Work Queue
//! ```
//!
//! # Core Types
//!
//! - [`CycleOrchestrator`] - Runs one collection cycle per delivered work item
//! - [`SourceAdapter`] - Vendor seam: one window/cursor in, one page out
//! - [`CatchUpPolicy`] - How fast windows grow for a stream that fell behind
//! - [`DedupGuard`] - At-most-once admission over redelivered work
//! - [`IngestionSink`] / [`WorkQueue`] / [`StateStore`] - consumed
//!   infrastructure interfaces, with SQLite and in-memory implementations
//!
//! Every invocation is treated as possibly-a-duplicate: the queue delivers at
//! least once, and the dedup guard — not the queue — is what keeps a window
//! from being emitted twice.

pub mod adapter;
pub mod config;
pub mod cycle;
pub mod dedup;
pub mod envelope;
pub mod pagination;
pub mod queue;
pub mod registry;
pub mod sink;
pub mod sources;
pub mod store;
pub mod stream;
pub mod throttle;
pub mod window;

// Re-export public types
pub use adapter::{AdapterError, ContinuationMode, PageResult, SourceAdapter};
pub use config::CollectorConfig;
pub use cycle::{CycleOrchestrator, CycleReport, LogStatusHook, StatusHook, StreamStatus};
pub use dedup::{Admission, DedupGuard};
pub use envelope::{FieldPathFormatter, LogEnvelope, LogFormatter};
pub use queue::{MemoryWorkQueue, SqliteWorkQueue, WorkQueue};
pub use registry::{build_streams, StreamHandle};
pub use sink::{emit_chunked, HttpIntakeSink, IngestionSink, SinkError};
pub use sources::{load_definitions, AuthType, StreamDefinition};
pub use store::{MemoryStateStore, SqliteStateStore, StateStore, WorkRecord, WorkStatus};
pub use stream::{StreamState, WorkItem};
pub use throttle::{classify, Classification, ErrorKind};
pub use window::{next_window, CatchUpPolicy, CollectionWindow, WindowPlan};
