// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! Handles authentication headers, SSE responses, and a single retry on
//! transient errors (429, 500, 503, 529).

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use threadline_core::ThreadlineError;
use tracing::{debug, warn};

use crate::sse::{self, EventStream};
use crate::types::{ApiErrorResponse, MessageRequest, MessageResponse};

/// Messages API endpoint.
const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: &str, api_version: &str) -> Result<Self, ThreadlineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| ThreadlineError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(api_version).map_err(|e| {
                ThreadlineError::Config(format!("invalid API version header value: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ThreadlineError::Execution {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Points the client at another endpoint (a proxy, or a test server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[cfg(test)]
    fn without_retry_delay(mut self) -> Self {
        self.retry_delay = Duration::ZERO;
        self
    }

    /// Sends a streaming request and returns the SSE event stream.
    pub async fn stream_message(
        &self,
        request: &MessageRequest,
    ) -> Result<EventStream, ThreadlineError> {
        let mut req = request.clone();
        req.stream = true;
        let response = self.send(&req).await?;
        Ok(sse::parse_sse_stream(response))
    }

    /// Sends a non-streaming request and returns the full response.
    pub async fn complete_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, ThreadlineError> {
        let mut req = request.clone();
        req.stream = false;
        let response = self.send(&req).await?;
        response
            .json::<MessageResponse>()
            .await
            .map_err(|e| ThreadlineError::Execution {
                message: format!("failed to parse API response: {e}"),
                source: Some(Box::new(e)),
            })
    }

    /// POSTs the request, retrying transient failures. Returns the first
    /// successful response.
    async fn send(&self, req: &MessageRequest) -> Result<reqwest::Response, ThreadlineError> {
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&self.base_url)
                .json(req)
                .send()
                .await
                .map_err(|e| ThreadlineError::Execution {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, stream = req.stream, "anthropic response received");
            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, attempt, "transient error, will retry");
                attempt += 1;
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!(
                    "Anthropic API error ({}): {}",
                    api_err.error.kind, api_err.error.message
                ),
                Err(_) => format!("API returned {status}: {body}"),
            };
            return Err(ThreadlineError::execution(message));
        }
    }
}

fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}
