//! Stream registry — turns stream definitions into the adapter/formatter
//! table the cycle orchestrator dispatches on.

use crate::adapter::SourceAdapter;
use crate::envelope::{FieldPathFormatter, LogFormatter};
use crate::sources::{token_from_env, HttpSourceAdapter, StreamDefinition};
use crate::window::CatchUpPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Producer identity stamped on every envelope this collector emits.
const SOURCE_NAME: &str = "trawler";

/// Everything the orchestrator needs to run one stream's cycles.
pub struct StreamHandle {
    pub adapter: Arc<dyn SourceAdapter>,
    pub formatter: Arc<dyn LogFormatter>,
    pub policy: CatchUpPolicy,
    pub poll_interval_secs: u64,
    /// Per-stream page budget; falls back to the collector default.
    pub max_pages: Option<u32>,
}

/// Build the stream table from loaded definitions.
///
/// Auth tokens are resolved from the environment here, once, at startup.
pub fn build_streams(definitions: Vec<StreamDefinition>) -> HashMap<String, StreamHandle> {
    let mut streams = HashMap::with_capacity(definitions.len());

    for def in definitions {
        let token = token_from_env(&def.id);
        if def.auth != crate::sources::AuthType::None && token.is_none() {
            info!(stream_id = %def.id, "No auth token in environment for authenticated stream");
        }

        let formatter = Arc::new(FieldPathFormatter::new(
            SOURCE_NAME,
            def.timestamp_pointer.clone(),
            def.type_pointer.clone(),
        ));

        let handle = StreamHandle {
            policy: def.catch_up,
            poll_interval_secs: def.poll_interval_secs,
            max_pages: def.max_pages,
            formatter,
            adapter: Arc::new(HttpSourceAdapter::new(def.clone(), token)),
        };

        streams.insert(def.id, handle);
    }

    streams
}
