//! Config-driven HTTP polling sources.
//!
//! Vendor-specific request shaping (URL layout, auth headers, response field
//! paths) stays in configuration; the scheduler core never sees it.

mod http;

pub use http::HttpSourceAdapter;

use crate::adapter::ContinuationMode;
use crate::window::CatchUpPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Auth scheme for an HTTP source.
///
/// Tokens are never stored in the definitions file — they are resolved from
/// `TRAWLER_TOKEN_<STREAM_ID>` at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthType {
    /// No authentication.
    None,
    /// `Authorization: Bearer <token>` header.
    BearerToken,
    /// Custom API key header.
    ApiKeyHeader { header_name: String },
}

impl Default for AuthType {
    fn default() -> Self {
        AuthType::None
    }
}

/// Definition of one logical data stream to collect.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamDefinition {
    /// Unique stream id (e.g. "acme.audit").
    pub id: String,
    /// URL template. `{since}` and `{until}` are replaced with the window
    /// bounds as RFC 3339.
    pub url: String,
    /// Nominal seconds between polls.
    pub poll_interval_secs: u64,
    /// How fast the window grows when the stream is behind.
    #[serde(default = "default_catch_up")]
    pub catch_up: CatchUpPolicy,
    /// Whether the API paginates by cursor or by window.
    pub continuation: ContinuationMode,
    /// Query parameter carrying the continuation cursor.
    #[serde(default)]
    pub cursor_param: Option<String>,
    /// JSON pointer to the records array in the response body. Empty string
    /// when the body itself is the array.
    #[serde(default)]
    pub records_pointer: String,
    /// JSON pointer to the next-page cursor in the response body.
    #[serde(default)]
    pub cursor_pointer: Option<String>,
    /// JSON pointer to the per-record timestamp.
    #[serde(default)]
    pub timestamp_pointer: Option<String>,
    /// JSON pointer to the per-record event-type id.
    #[serde(default)]
    pub type_pointer: Option<String>,
    /// Authentication scheme (token resolved from the environment).
    #[serde(default)]
    pub auth: AuthType,
    /// Per-stream page budget override.
    #[serde(default)]
    pub max_pages: Option<u32>,
}

fn default_catch_up() -> CatchUpPolicy {
    CatchUpPolicy::HourCap
}

/// Load stream definitions from a JSON file.
pub fn load_definitions<P: AsRef<Path>>(path: P) -> Result<Vec<StreamDefinition>> {
    let raw = std::fs::read_to_string(path.as_ref()).with_context(|| {
        format!(
            "Failed to read stream definitions from {}",
            path.as_ref().display()
        )
    })?;
    serde_json::from_str(&raw).context("Failed to parse stream definitions")
}

/// Resolve the auth token for a stream from the environment.
///
/// Non-alphanumeric characters in the stream id map to `_`, so the stream
/// "acme.audit" reads `TRAWLER_TOKEN_ACME_AUDIT`.
pub fn token_from_env(stream_id: &str) -> Option<String> {
    let suffix: String = stream_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    std::env::var(format!("TRAWLER_TOKEN_{}", suffix)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_parse_from_json() {
        let json = r#"[
            {
                "id": "acme.audit",
                "url": "https://api.acme.test/v1/audit?from={since}&to={until}",
                "poll_interval_secs": 300,
                "catch_up": "hour-day-progression",
                "continuation": "cursor",
                "cursor_param": "page_token",
                "records_pointer": "/data/items",
                "cursor_pointer": "/data/next",
                "timestamp_pointer": "/createdAt",
                "type_pointer": "/action",
                "auth": {"type": "BearerToken"}
            },
            {
                "id": "acme.alerts",
                "url": "https://api.acme.test/v1/alerts?from={since}&to={until}",
                "poll_interval_secs": 60,
                "continuation": "window"
            }
        ]"#;

        let defs: Vec<StreamDefinition> = serde_json::from_str(json).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].catch_up, CatchUpPolicy::HourDayProgression);
        assert_eq!(defs[0].continuation, ContinuationMode::Cursor);
        assert_eq!(defs[0].auth, AuthType::BearerToken);

        // Defaults for the minimal definition
        assert_eq!(defs[1].catch_up, CatchUpPolicy::HourCap);
        assert_eq!(defs[1].auth, AuthType::None);
        assert!(defs[1].cursor_param.is_none());
        assert_eq!(defs[1].records_pointer, "");
    }

    #[test]
    fn test_token_env_name_mapping() {
        std::env::set_var("TRAWLER_TOKEN_ACME_AUDIT", "s3cret");
        assert_eq!(token_from_env("acme.audit").as_deref(), Some("s3cret"));
        assert!(token_from_env("no.such.stream").is_none());
        std::env::remove_var("TRAWLER_TOKEN_ACME_AUDIT");
    }
}
