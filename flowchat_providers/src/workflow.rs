use std::time::Duration;

use async_trait::async_trait;
use flowchat_core::{BackendError, ChunkStream, WorkflowBackend, WorkflowRequest};
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, info};

use crate::retry::{backoff_delays, retry_with_backoff};
use crate::sse::decode_stream;

const DEFAULT_USER: &str = "flowchat";

#[derive(Debug, Serialize)]
struct RunInputs<'a> {
    query: &'a str,
    history: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<&'a str>,
    is_rag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct RunBody<'a> {
    inputs: RunInputs<'a>,
    response_mode: &'static str,
    user: &'a str,
}

impl<'a> RunBody<'a> {
    fn from_request(request: &'a WorkflowRequest) -> Self {
        Self {
            inputs: RunInputs {
                query: &request.query,
                history: &request.history,
                file_id: request.file_object_id.as_deref(),
                is_rag: request.is_rag,
                system_prompt: request.system_prompt.as_deref(),
            },
            response_mode: "streaming",
            user: request.user_id.as_deref().unwrap_or(DEFAULT_USER),
        }
    }
}

/// Streaming client for a workflow `/workflows/run` endpoint.
pub struct WorkflowClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry_delays: Vec<Duration>,
}

impl WorkflowClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into();
        info!("Creating WorkflowClient for {base_url}");
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url,
            retry_delays: backoff_delays(2),
        }
    }

    /// Number of extra connection attempts for retryable failures.
    #[must_use]
    pub fn with_connect_retries(mut self, retries: usize) -> Self {
        self.retry_delays = backoff_delays(retries);
        self
    }

    #[must_use]
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/workflows/run", self.base_url.trim_end_matches('/'))
    }

    /// Open the stream once. Fails before any byte of the answer is read.
    async fn try_connect(&self, body: &RunBody<'_>) -> Result<Response, BackendError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    BackendError::network(format!("cannot reach workflow backend: {e}"))
                } else {
                    BackendError::backend(format!("workflow request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), text));
        }
        Ok(response)
    }
}

#[async_trait]
impl WorkflowBackend for WorkflowClient {
    async fn submit_streaming(
        &self,
        request: &WorkflowRequest,
    ) -> Result<ChunkStream, BackendError> {
        let body = RunBody::from_request(request);
        debug!(
            "Submitting workflow run: query={} chars, history={} chars",
            request.query.len(),
            request.history.len()
        );

        let response = retry_with_backoff(
            || self.try_connect(&body),
            &self.retry_delays,
            BackendError::is_retryable,
        )
        .await?;

        info!("Workflow stream opened ({})", response.status());
        Ok(decode_stream(response.bytes_stream()))
    }
}
