use super::{IngestionSink, SinkError};
use crate::envelope::LogEnvelope;
use async_trait::async_trait;
use tracing::info;

/// Default intake batch ceiling.
const DEFAULT_MAX_BATCH: usize = 500;

/// HTTP intake sink.
///
/// POSTs JSON batches to `{base_url}/api/logs` with bearer auth. Non-2xx
/// responses are surfaced with the response body so operators can see the
/// intake's rejection reason.
pub struct HttpIntakeSink {
    base_url: String,
    auth_token: Option<String>,
    http_client: reqwest::Client,
    max_batch: usize,
}

impl HttpIntakeSink {
    pub fn new(base_url: String, auth_token: Option<String>) -> Self {
        Self {
            base_url,
            auth_token,
            http_client: reqwest::Client::new(),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    /// Override the batch ceiling (intake deployments document their own).
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }
}

#[async_trait]
impl IngestionSink for HttpIntakeSink {
    async fn emit(&self, batch: &[LogEnvelope]) -> Result<(), SinkError> {
        let url = format!("{}/api/logs", self.base_url);

        let mut request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(batch);

        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(SinkError::Rejected { status, body });
        }

        info!(record_count = batch.len(), "Emitted batch to intake");
        Ok(())
    }

    fn max_batch_size(&self) -> Option<usize> {
        Some(self.max_batch)
    }
}
