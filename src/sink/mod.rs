//! Ingestion sink — the downstream service that durably stores formatted
//! logs. The scheduler is responsible for chunking batches to the sink's
//! documented maximum, not the sink.

mod http;

pub use http::HttpIntakeSink;

use crate::envelope::LogEnvelope;
use async_trait::async_trait;
use thiserror::Error;

/// Error from an ingestion sink emit.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Transport-level failure — the batch may or may not have been received.
    #[error("intake request failed: {0}")]
    Request(String),

    /// The sink rejected the batch.
    #[error("intake returned status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Downstream destination for formatted log batches.
#[async_trait]
pub trait IngestionSink: Send + Sync {
    /// Durably hand off one batch. Callers must respect `max_batch_size`.
    async fn emit(&self, batch: &[LogEnvelope]) -> Result<(), SinkError>;

    /// Documented maximum batch size, if the sink has one.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }
}

/// Emit `envelopes` through the sink in chunks of at most its documented
/// maximum batch size. Stops at the first failed chunk.
pub async fn emit_chunked(
    sink: &dyn IngestionSink,
    envelopes: &[LogEnvelope],
) -> Result<(), SinkError> {
    if envelopes.is_empty() {
        return Ok(());
    }

    match sink.max_batch_size() {
        Some(max) if max > 0 => {
            for chunk in envelopes.chunks(max) {
                sink.emit(chunk).await?;
            }
            Ok(())
        }
        _ => sink.emit(envelopes).await,
    }
}
