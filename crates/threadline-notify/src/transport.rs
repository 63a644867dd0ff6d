// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery transports: SMTP email and JSON webhooks.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::{Value, json};
use threadline_config::model::NotificationsConfig;
use threadline_core::ThreadlineError;

use crate::message::Notice;

/// Header block text limit on Slack.
const SLACK_HEADER_LIMIT: usize = 150;
/// Section block text limit on Slack.
const SLACK_SECTION_LIMIT: usize = 3000;

fn notification_error(channel: &str, message: impl Into<String>) -> ThreadlineError {
    ThreadlineError::Notification {
        channel: channel.to_string(),
        message: message.into(),
    }
}

/// Sends a plain-text email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, to: &str, notice: &Notice) -> Result<(), ThreadlineError>;
}

/// SMTP relay over STARTTLS via lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// Builds a mailer from the notifications section. Returns `None` when no
    /// SMTP host is configured.
    pub fn from_config(config: &NotificationsConfig) -> Result<Option<Self>, ThreadlineError> {
        let Some(host) = config.smtp_host.as_deref().filter(|h| !h.is_empty()) else {
            return Ok(None);
        };
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| ThreadlineError::Config(format!("invalid smtp_host `{host}`: {e}")))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.http_timeout_secs)));
        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Some(Self {
            transport: builder.build(),
            from: config.from_address.clone(),
        }))
    }
}

#[async_trait]
impl EmailSender for SmtpMailer {
    async fn send_email(&self, to: &str, notice: &Notice) -> Result<(), ThreadlineError> {
        let from = self
            .from
            .parse::<Mailbox>()
            .map_err(|e| notification_error("email", format!("invalid from address: {e}")))?;
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| notification_error("email", format!("invalid recipient: {e}")))?;
        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(notice.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(notice.body.clone())
            .map_err(|e| notification_error("email", format!("failed to build message: {e}")))?;
        self.transport
            .send(email)
            .await
            .map_err(|e| notification_error("email", format!("smtp delivery failed: {e}")))?;
        Ok(())
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

/// Slack incoming-webhook payload: a header plus an mrkdwn section.
pub fn slack_payload(notice: &Notice) -> Value {
    json!({
        "text": notice.subject,
        "blocks": [
            { "type": "header", "text": { "type": "plain_text", "text": truncate(&notice.subject, SLACK_HEADER_LIMIT) } },
            { "type": "section", "text": { "type": "mrkdwn", "text": truncate(&notice.body, SLACK_SECTION_LIMIT) } },
        ]
    })
}

/// Generic webhook payload.
pub fn webhook_payload(notice: &Notice) -> Value {
    json!({ "title": notice.subject, "message": notice.body })
}

/// JSON poster shared by the Slack and generic webhook channels.
#[derive(Debug, Clone)]
pub struct WebhookPoster {
    client: reqwest::Client,
}

impl WebhookPoster {
    pub fn new(timeout: Duration) -> Result<Self, ThreadlineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ThreadlineError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// POSTs `payload`. Errors never include the URL, which may embed a credential.
    pub async fn post(&self, channel: &str, url: &str, payload: &Value) -> Result<(), ThreadlineError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| notification_error(channel, format!("request failed: {}", e.without_url())))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(notification_error(channel, format!("endpoint returned {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> Notice {
        Notice {
            subject: "Task Failed: triggered".into(),
            body: "Task ID: t1".into(),
        }
    }

    #[test]
    fn slack_payload_has_header_and_section() {
        let payload = slack_payload(&notice());
        assert_eq!(payload["blocks"][0]["type"], "header");
        assert_eq!(payload["blocks"][0]["text"]["text"], "Task Failed: triggered");
        assert_eq!(payload["blocks"][1]["text"]["type"], "mrkdwn");
    }

    #[test]
    fn slack_payload_truncates_long_bodies() {
        let long = Notice {
            subject: "s".into(),
            body: "x".repeat(5000),
        };
        let payload = slack_payload(&long);
        let text = payload["blocks"][1]["text"]["text"].as_str().unwrap();
        assert_eq!(text.chars().count(), SLACK_SECTION_LIMIT);
    }

    #[test]
    fn webhook_payload_shape() {
        let payload = webhook_payload(&notice());
        assert_eq!(payload, json!({ "title": "Task Failed: triggered", "message": "Task ID: t1" }));
    }

    #[test]
    fn mailer_is_optional() {
        let config = NotificationsConfig::default();
        assert!(SmtpMailer::from_config(&config).unwrap().is_none());
    }
}
