// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal Slack Web API client.
//!
//! Slack answers HTTP 200 for most failures and reports them through the
//! `ok`/`error` fields of the JSON body, so both layers are checked.

use serde::Deserialize;
use serde_json::{Value, json};
use threadline_core::ThreadlineError;
use tracing::debug;

/// Common envelope of Web API responses.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// Parameters of a `chat.postMessage` call.
#[derive(Debug, Default)]
pub struct PostMessage<'a> {
    pub channel: &'a str,
    pub text: &'a str,
    pub thread_ts: Option<&'a str>,
    pub blocks: Option<Vec<Value>>,
    /// Slack message metadata (`event_type` + `event_payload`).
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct SlackApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl SlackApi {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn call(&self, method: &str, body: &Value) -> Result<ApiResponse, ThreadlineError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| ThreadlineError::Channel {
                message: format!("slack {method} request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ThreadlineError::channel(format!(
                "slack {method} returned HTTP {status}"
            )));
        }

        let parsed: ApiResponse = response.json().await.map_err(|e| ThreadlineError::Channel {
            message: format!("slack {method} returned an unreadable body: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(method, ok = parsed.ok, "slack api call finished");

        if parsed.ok {
            Ok(parsed)
        } else {
            Err(ThreadlineError::channel(format!(
                "slack {method} failed: {}",
                parsed.error.as_deref().unwrap_or("unknown_error")
            )))
        }
    }

    /// `chat.postMessage`. Returns the new message's `ts`.
    pub async fn post_message(&self, msg: PostMessage<'_>) -> Result<String, ThreadlineError> {
        let mut body = json!({ "channel": msg.channel, "text": msg.text });
        if let Some(thread_ts) = msg.thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }
        if let Some(blocks) = msg.blocks {
            body["blocks"] = Value::Array(blocks);
        }
        if let Some(metadata) = msg.metadata {
            body["metadata"] = metadata;
        }
        let response = self.call("chat.postMessage", &body).await?;
        response
            .ts
            .ok_or_else(|| ThreadlineError::channel("slack chat.postMessage returned no ts"))
    }

    /// `chat.update`, replacing the whole text of a message.
    pub async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
    ) -> Result<(), ThreadlineError> {
        let body = json!({ "channel": channel, "ts": ts, "text": text });
        self.call("chat.update", &body).await.map(|_| ())
    }

    pub async fn add_reaction(
        &self,
        channel: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), ThreadlineError> {
        let body = json!({ "channel": channel, "timestamp": ts, "name": name });
        match self.call("reactions.add", &body).await {
            Err(ThreadlineError::Channel { message, .. })
                if message.ends_with("already_reacted") =>
            {
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    pub async fn remove_reaction(
        &self,
        channel: &str,
        ts: &str,
        name: &str,
    ) -> Result<(), ThreadlineError> {
        let body = json!({ "channel": channel, "timestamp": ts, "name": name });
        match self.call("reactions.remove", &body).await {
            Err(ThreadlineError::Channel { message, .. }) if message.ends_with("no_reaction") => {
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    /// `auth.test`, used for health checks.
    pub async fn auth_test(&self) -> Result<(), ThreadlineError> {
        self.call("auth.test", &json!({})).await.map(|_| ())
    }
}
