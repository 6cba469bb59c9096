use super::{AuthType, StreamDefinition};
use crate::adapter::{AdapterError, ContinuationMode, PageResult, SourceAdapter};
use crate::envelope::parse_timestamp;
use crate::window::CollectionWindow;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Generic HTTP source adapter.
///
/// Substitutes the collection window into a URL template, appends the cursor
/// parameter when resuming, and extracts records/cursor/timestamps from the
/// response via the definition's JSON pointers.
pub struct HttpSourceAdapter {
    definition: StreamDefinition,
    auth_token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpSourceAdapter {
    pub fn new(definition: StreamDefinition, auth_token: Option<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent("trawler-collector/0.1")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            definition,
            auth_token,
            http_client,
        }
    }

    fn build_url(&self, window: &CollectionWindow, cursor: Option<&str>) -> String {
        let since = format_ts(window.since);
        let until = format_ts(window.until);
        let mut url = self
            .definition
            .url
            .replace("{since}", &since)
            .replace("{until}", &until);

        if let (Some(cursor), Some(param)) = (cursor, self.definition.cursor_param.as_deref()) {
            let sep = if url.contains('?') { '&' } else { '?' };
            url.push(sep);
            url.push_str(param);
            url.push('=');
            url.push_str(cursor);
        }

        url
    }

    fn parse_body(&self, body: &Value) -> PageResult {
        let records: Vec<Value> = match body.pointer(&self.definition.records_pointer) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        let cursor = self
            .definition
            .cursor_pointer
            .as_deref()
            .and_then(|p| body.pointer(p))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from);

        let newest_record_at = self.newest_timestamp(&records);

        PageResult {
            records,
            cursor,
            newest_record_at,
        }
    }

    fn newest_timestamp(&self, records: &[Value]) -> Option<DateTime<Utc>> {
        let pointer = self.definition.timestamp_pointer.as_deref()?;
        records
            .iter()
            .filter_map(|r| r.pointer(pointer))
            .filter_map(parse_timestamp)
            .max()
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Map a non-2xx response to an adapter error.
///
/// - 429 (or 403 with a drained X-RateLimit-Remaining) → rate limited,
///   carrying the Retry-After hint when present
/// - other statuses pass through for the throttle governor to classify
fn status_to_error(status: u16, retry_after: Option<u64>, rate_remaining: Option<u64>) -> AdapterError {
    if status == 429 || (status == 403 && rate_remaining == Some(0)) {
        return AdapterError {
            status: Some(status),
            retry_after_secs: retry_after,
            rate_limited: true,
            message: format!("vendor rate limit exceeded (status {})", status),
        };
    }
    AdapterError::http(status, format!("vendor API error: status {}", status))
}

#[async_trait]
impl SourceAdapter for HttpSourceAdapter {
    fn stream_id(&self) -> &str {
        &self.definition.id
    }

    fn continuation_mode(&self) -> ContinuationMode {
        self.definition.continuation
    }

    async fn fetch_page(
        &self,
        window: &CollectionWindow,
        cursor: Option<&str>,
    ) -> Result<PageResult, AdapterError> {
        let url = self.build_url(window, cursor);

        let mut request = self.http_client.get(&url);
        match (&self.definition.auth, &self.auth_token) {
            (AuthType::BearerToken, Some(token)) => {
                request = request.bearer_auth(token);
            }
            (AuthType::ApiKeyHeader { header_name }, Some(token)) => {
                request = request.header(header_name.as_str(), token);
            }
            _ => {}
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::network(format!("request failed: {}", e)))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = header_u64(&response, "Retry-After");
            let rate_remaining = header_u64(&response, "X-RateLimit-Remaining");
            return Err(status_to_error(status, retry_after, rate_remaining));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::network(format!("failed to parse response body: {}", e)))?;

        Ok(self.parse_body(&body))
    }
}

fn header_u64(response: &reqwest::Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn definition(url: String) -> StreamDefinition {
        StreamDefinition {
            id: "acme.audit".to_string(),
            url,
            poll_interval_secs: 300,
            catch_up: crate::window::CatchUpPolicy::HourCap,
            continuation: ContinuationMode::Cursor,
            cursor_param: Some("page_token".to_string()),
            records_pointer: "/items".to_string(),
            cursor_pointer: Some("/next".to_string()),
            timestamp_pointer: Some("/ts".to_string()),
            type_pointer: None,
            auth: AuthType::BearerToken,
            max_pages: None,
        }
    }

    fn window() -> CollectionWindow {
        let until = "2026-08-01T12:05:00Z".parse().unwrap();
        let since = "2026-08-01T12:00:00Z".parse().unwrap();
        CollectionWindow::new(since, until)
    }

    #[tokio::test]
    async fn test_fetch_page_substitutes_window_and_parses() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/v1/audit?from=2026-08-01T12:00:00Z&to=2026-08-01T12:05:00Z",
            )
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "items": [
                        {"ts": "2026-08-01T12:01:00Z", "action": "login"},
                        {"ts": "2026-08-01T12:03:00Z", "action": "logout"}
                    ],
                    "next": "cursor-2"
                }"#,
            )
            .create_async()
            .await;

        let def = definition(format!("{}/v1/audit?from={{since}}&to={{until}}", server.url()));
        let adapter = HttpSourceAdapter::new(def, Some("tok".to_string()));

        let page = adapter.fetch_page(&window(), None).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.cursor.as_deref(), Some("cursor-2"));
        assert_eq!(
            page.newest_record_at,
            Some("2026-08-01T12:03:00Z".parse().unwrap())
        );

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cursor_appended_to_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/v1/audit?from=2026-08-01T12:00:00Z&to=2026-08-01T12:05:00Z&page_token=cursor-2",
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items": [], "next": null}"#)
            .create_async()
            .await;

        let def = definition(format!("{}/v1/audit?from={{since}}&to={{until}}", server.url()));
        let adapter = HttpSourceAdapter::new(def, None);

        let page = adapter.fetch_page(&window(), Some("cursor-2")).await.unwrap();
        assert!(page.records.is_empty());
        assert!(page.cursor.is_none());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited_with_hint() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(429)
            .with_header("Retry-After", "360")
            .create_async()
            .await;

        let def = definition(format!("{}/v1/audit?from={{since}}&to={{until}}", server.url()));
        let adapter = HttpSourceAdapter::new(def, None);

        let err = adapter.fetch_page(&window(), None).await.unwrap_err();
        assert!(err.rate_limited);
        assert_eq!(err.retry_after_secs, Some(360));
    }

    #[tokio::test]
    async fn test_403_with_drained_quota_is_rate_limited() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(403)
            .with_header("X-RateLimit-Remaining", "0")
            .create_async()
            .await;

        let def = definition(format!("{}/v1/audit?from={{since}}&to={{until}}", server.url()));
        let adapter = HttpSourceAdapter::new(def, None);

        let err = adapter.fetch_page(&window(), None).await.unwrap_err();
        assert!(err.rate_limited);
        assert_eq!(err.status, Some(403));
    }

    #[tokio::test]
    async fn test_plain_403_is_not_rate_limited() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let def = definition(format!("{}/v1/audit?from={{since}}&to={{until}}", server.url()));
        let adapter = HttpSourceAdapter::new(def, None);

        let err = adapter.fetch_page(&window(), None).await.unwrap_err();
        assert!(!err.rate_limited);
        assert_eq!(err.status, Some(403));
    }

    #[tokio::test]
    async fn test_root_array_body_with_empty_pointer() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"ts": "2026-08-01T12:01:00Z"}]"#)
            .create_async()
            .await;

        let mut def = definition(format!("{}/v1/audit?from={{since}}&to={{until}}", server.url()));
        def.records_pointer = String::new();
        def.cursor_pointer = None;
        let adapter = HttpSourceAdapter::new(def, None);

        let page = adapter.fetch_page(&window(), None).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let def = definition("http://localhost:9/v1/audit?from={since}&to={until}".to_string());
        let adapter = HttpSourceAdapter::new(def, None);

        let err = adapter.fetch_page(&window(), None).await.unwrap_err();
        assert!(err.status.is_none());
        assert!(!err.rate_limited);
    }

    #[test]
    fn test_window_timestamps_truncated_to_seconds() {
        let ts: DateTime<Utc> = "2026-08-01T12:00:00.123456Z".parse().unwrap();
        assert_eq!(format_ts(ts), "2026-08-01T12:00:00Z");
    }
}
