use crate::window::CollectionWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-stream scheduling state persisted between cycles.
///
/// Owned exclusively by the cycle that carries it; rebuilt wholesale each
/// cycle rather than patched in place. Travels as the work-queue message body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamState {
    /// Logical data-stream id (a vendor may expose several independent
    /// streams, e.g. "audit" vs "alerts").
    pub stream_id: String,
    /// Window to request this cycle. `None` when no previous state exists or
    /// the persisted window failed to parse — the cycle synthesizes a fresh
    /// one.
    #[serde(default)]
    pub window: Option<CollectionWindow>,
    /// Mid-stream continuation token from a page-budget early stop.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Nominal seconds between polls at steady state.
    pub poll_interval_secs: u64,
    /// While set and in the future, the vendor's quota is assumed exhausted
    /// and the adapter is not called.
    #[serde(default)]
    pub quota_reset_at: Option<DateTime<Utc>>,
    /// Consecutive bounded-retry failures (404s) for this stream.
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl StreamState {
    /// Initial state for a newly registered stream.
    pub fn initial(stream_id: impl Into<String>, poll_interval_secs: u64) -> Self {
        Self {
            stream_id: stream_id.into(),
            window: None,
            cursor: None,
            poll_interval_secs,
            quota_reset_at: None,
            consecutive_failures: 0,
        }
    }
}

/// One unit of scheduled work: a dedup id plus the stream state to advance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkItem {
    /// Dedup identity of this unit. Redeliveries of the same message carry
    /// the same id; a freshly enqueued cycle gets a new one.
    pub work_id: String,
    pub state: StreamState,
}

impl WorkItem {
    /// Wrap a state in a new work unit with a time-ordered id.
    pub fn next(state: StreamState) -> Self {
        Self {
            work_id: Uuid::now_v7().to_string(),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_state_round_trips_through_json() {
        let now = Utc::now();
        let state = StreamState {
            stream_id: "vendor.audit".to_string(),
            window: Some(CollectionWindow::new(now - Duration::seconds(60), now)),
            cursor: Some("abc123".to_string()),
            poll_interval_secs: 300,
            quota_reset_at: None,
            consecutive_failures: 2,
        };

        let json = serde_json::to_string(&state).unwrap();
        let back: StreamState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stream_id, "vendor.audit");
        assert_eq!(back.window, state.window);
        assert_eq!(back.cursor.as_deref(), Some("abc123"));
        assert_eq!(back.consecutive_failures, 2);
    }

    #[test]
    fn test_missing_window_deserializes_as_none() {
        // Persisted state from before a window was ever computed
        let json = r#"{"stream_id":"s1","poll_interval_secs":60}"#;
        let state: StreamState = serde_json::from_str(json).unwrap();
        assert!(state.window.is_none());
        assert!(state.cursor.is_none());
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_work_items_get_distinct_ids() {
        let a = WorkItem::next(StreamState::initial("s1", 60));
        let b = WorkItem::next(StreamState::initial("s1", 60));
        assert_ne!(a.work_id, b.work_id);
    }
}
