use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Normalized log envelope handed to the ingestion sink.
///
/// A fixed envelope around an opaque vendor payload. Records are time-ordered
/// via UUIDv7 identifiers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEnvelope {
    /// UUIDv7 identifier (time-ordered, globally unique)
    #[serde(rename = "recordId")]
    pub record_id: String,

    /// Logical stream the record was collected from
    pub stream: String,

    /// Producer identity (the collector instance)
    pub source: String,

    /// Unix epoch milliseconds (vendor record time, or collection time when
    /// the vendor record carries none)
    pub timestamp: i64,

    /// Vendor event-type identifier, when one could be extracted
    #[serde(rename = "typeId")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,

    /// Raw vendor record (opaque to the scheduler)
    pub payload: Value,
}

/// Maps one raw vendor record into the normalized envelope.
///
/// Extraction config (timestamp path, type path) is explicit state on the
/// formatter — it is never passed through shared globals.
pub trait LogFormatter: Send + Sync {
    fn format(&self, stream_id: &str, raw: &Value) -> LogEnvelope;
}

/// Formatter driven by JSON pointers into the raw record.
///
/// Timestamps are accepted as epoch seconds, epoch milliseconds, or RFC 3339
/// strings; anything else falls back to collection time so a malformed record
/// can never wedge a stream.
pub struct FieldPathFormatter {
    /// Producer identity stamped on every envelope.
    pub source: String,
    /// JSON pointer to the record timestamp (e.g. "/attributes/createdAt").
    pub timestamp_pointer: Option<String>,
    /// JSON pointer to the vendor event-type id.
    pub type_pointer: Option<String>,
}

impl FieldPathFormatter {
    pub fn new(
        source: impl Into<String>,
        timestamp_pointer: Option<String>,
        type_pointer: Option<String>,
    ) -> Self {
        Self {
            source: source.into(),
            timestamp_pointer,
            type_pointer,
        }
    }

    fn extract_timestamp_ms(&self, raw: &Value) -> Option<i64> {
        let pointer = self.timestamp_pointer.as_deref()?;
        parse_timestamp_ms(raw.pointer(pointer)?)
    }

    fn extract_type_id(&self, raw: &Value) -> Option<String> {
        let pointer = self.type_pointer.as_deref()?;
        match raw.pointer(pointer)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl LogFormatter for FieldPathFormatter {
    fn format(&self, stream_id: &str, raw: &Value) -> LogEnvelope {
        let timestamp = self
            .extract_timestamp_ms(raw)
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        LogEnvelope {
            record_id: Uuid::now_v7().to_string(),
            stream: stream_id.to_string(),
            source: self.source.clone(),
            timestamp,
            type_id: self.extract_type_id(raw),
            payload: raw.clone(),
        }
    }
}

/// Parse a timestamp value into epoch milliseconds.
///
/// Numbers at or above 10^12 are treated as milliseconds, below as seconds
/// (10^12 ms is 2001; no vendor emits second-precision timestamps that
/// large). Strings must be RFC 3339.
pub fn parse_timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let n = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            if n >= 1_000_000_000_000 {
                Some(n)
            } else {
                Some(n * 1000)
            }
        }
        Value::String(s) => s
            .parse::<DateTime<Utc>>()
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

/// Parse a timestamp value into a `DateTime<Utc>` (for newest-record
/// tracking in window-mode adapters).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let ms = parse_timestamp_ms(value)?;
    DateTime::<Utc>::from_timestamp_millis(ms)
}
