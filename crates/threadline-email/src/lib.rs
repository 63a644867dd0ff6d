// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Email channel adapter backed by Mailgun.
//!
//! Inbound mail arrives through a Mailgun route that posts the parsed message
//! to the channel webhook; replies go out through the Mailgun messages API.
//! Email cannot be edited or reacted to, so only the rich-content facet is
//! implemented and the preferred style is comprehensive.

pub mod format;
pub mod inbound;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use threadline_config::model::EmailConfig;
use threadline_core::traits::{ChannelAdapter, PluginAdapter, RichDelivery};
use threadline_core::types::{AdapterType, ConversationId, HealthStatus, RawRequest, ReceivedMessage, RichMessage};
use threadline_core::{ChannelCapabilities, MessageStyle, ThreadlineError};
use threadline_security::signature;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: String,
}

/// Mailgun email channel adapter implementing [`ChannelAdapter`].
pub struct EmailChannel {
    client: reqwest::Client,
    api_key: String,
    messages_url: String,
    from_address: String,
}

impl EmailChannel {
    /// Creates a new email adapter.
    ///
    /// Requires `email.api_key` and `email.domain`.
    pub fn new(config: &EmailConfig) -> Result<Self, ThreadlineError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ThreadlineError::Config("email.api_key is required".into()))?;
        let domain = config
            .domain
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ThreadlineError::Config("email.domain is required".into()))?;

        let from_address = config
            .from_address
            .clone()
            .unwrap_or_else(|| format!("threadline@{domain}"));

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            messages_url: format!(
                "{}/{domain}/messages",
                config.api_base_url.trim_end_matches('/')
            ),
            from_address,
        })
    }

    /// POSTs a message form to Mailgun and returns the assigned message id.
    async fn post(&self, form: Vec<(&str, String)>) -> Result<String, ThreadlineError> {
        let response = self
            .client
            .post(&self.messages_url)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| ThreadlineError::Channel {
                message: format!("failed to contact Mailgun: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "mailgun rejected message");
            return Err(ThreadlineError::channel(format!(
                "Mailgun API error: {status}"
            )));
        }

        let parsed: SendResponse = response.json().await.map_err(|e| ThreadlineError::Channel {
            message: format!("unreadable Mailgun response: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(parsed.id)
    }

    /// Common envelope fields for a reply.
    fn envelope(
        &self,
        thread_id: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<Vec<(&'static str, String)>, ThreadlineError> {
        let recipient = metadata
            .and_then(|m| m.get("from_addr"))
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| {
                ThreadlineError::Validation("email metadata must include from_addr".into())
            })?;
        let subject = metadata
            .and_then(|m| m.get("subject"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let thread_id = thread_id.filter(|t| !t.is_empty());

        let mut form = vec![
            ("from", self.from_address.clone()),
            ("to", recipient.to_string()),
            ("subject", format::reply_subject(subject, thread_id.is_some())),
        ];
        if let Some(thread) = thread_id {
            form.push(("h:In-Reply-To", thread.to_string()));
            form.push(("h:References", thread.to_string()));
        }
        Ok(form)
    }
}

#[async_trait]
impl PluginAdapter for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ThreadlineError> {
        // Mailgun has no cheap authenticated probe; configuration was checked at startup.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ThreadlineError> {
        debug!("email channel shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for EmailChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_streaming: false,
            supports_threading: true,
            supports_rich_formatting: true,
            supports_interactive_elements: false,
            supports_reactions: false,
            supports_editing: false,
            supports_attachments: true,
            message_style: MessageStyle::Comprehensive,
            max_message_length: None,
        }
    }

    fn receive_message(&self, request: &RawRequest) -> Result<ReceivedMessage, ThreadlineError> {
        inbound::parse_inbound(&request.form_fields())
    }

    fn verify_request(&self, request: &RawRequest) -> bool {
        let fields = request.form_fields();
        let (Some(timestamp), Some(token), Some(sig)) = (
            fields.get("timestamp"),
            fields.get("token"),
            fields.get("signature"),
        ) else {
            warn!("mailgun webhook missing signature fields");
            return false;
        };
        match signature::verify_mailgun_signature(
            &self.api_key,
            timestamp,
            token,
            sig,
            signature::unix_now(),
        ) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "rejecting mailgun webhook");
                false
            }
        }
    }

    async fn send_message(
        &self,
        text: &str,
        conversation_id: &ConversationId,
        thread_id: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<String, ThreadlineError> {
        let mut form = self.envelope(thread_id, metadata)?;
        form.push(("text", text.to_string()));
        let id = self.post(form).await?;
        info!(conversation_id = %conversation_id, message_id = %id, "email sent");
        Ok(id)
    }

    fn rich(&self) -> Option<&dyn RichDelivery> {
        Some(self)
    }
}

#[async_trait]
impl RichDelivery for EmailChannel {
    async fn send_rich_message(
        &self,
        message: &RichMessage,
        conversation_id: &ConversationId,
        thread_id: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<String, ThreadlineError> {
        let html = match &message.formatting {
            Value::String(html) => html.clone(),
            Value::Object(map) => match map.get("html").and_then(Value::as_str) {
                Some(html) => html.to_string(),
                None => format::markdown_to_html(&message.text),
            },
            _ => format::markdown_to_html(&message.text),
        };
        let text = if message.fallback_text.is_empty() {
            message.text.clone()
        } else {
            message.fallback_text.clone()
        };

        let mut form = self.envelope(thread_id, metadata)?;
        form.push(("text", text));
        form.push(("html", html));
        let id = self.post(form).await?;
        info!(conversation_id = %conversation_id, message_id = %id, "rich email sent");
        Ok(id)
    }
}
