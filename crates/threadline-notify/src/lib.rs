// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task notification fan-out for Threadline.
//!
//! [`Notifier`] implements [`TaskNotifier`]: each destination configured on a
//! task is attempted on its own, and a failing destination is logged without
//! affecting the others or the task itself.

pub mod message;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use threadline_config::model::NotificationsConfig;
use threadline_core::types::{NotificationChannel, Task};
use threadline_core::{TaskNotifier, ThreadlineError};
use threadline_security::redact::redact_url;
use tracing::{debug, info, warn};

use crate::message::Notice;
use crate::transport::{EmailSender, SmtpMailer, WebhookPoster, slack_payload, webhook_payload};

/// Delivers task notifications over email, Slack webhooks, and generic webhooks.
pub struct Notifier {
    mailer: Option<Arc<dyn EmailSender>>,
    poster: WebhookPoster,
    public_base_url: Option<String>,
}

impl Notifier {
    /// Builds a notifier from the `[notifications]` section.
    pub fn from_config(config: &NotificationsConfig) -> Result<Self, ThreadlineError> {
        let mailer = SmtpMailer::from_config(config)?.map(|m| Arc::new(m) as Arc<dyn EmailSender>);
        Ok(Self {
            mailer,
            poster: WebhookPoster::new(Duration::from_secs(config.http_timeout_secs))?,
            public_base_url: config.public_base_url.clone(),
        })
    }

    /// Replaces the email transport.
    pub fn with_email_sender(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.mailer = Some(sender);
        self
    }

    async fn deliver(&self, channel: &NotificationChannel, notice: &Notice) -> Result<(), ThreadlineError> {
        match channel {
            NotificationChannel::Email { address } => match &self.mailer {
                Some(mailer) => mailer.send_email(address, notice).await,
                None => Err(ThreadlineError::Notification {
                    channel: "email".into(),
                    message: "no SMTP relay configured".into(),
                }),
            },
            NotificationChannel::Slack { webhook_url } => {
                self.poster
                    .post("slack", webhook_url, &slack_payload(notice))
                    .await
            }
            NotificationChannel::Webhook { url } => {
                self.poster.post("webhook", url, &webhook_payload(notice)).await
            }
        }
    }

    /// Attempts every configured destination and returns how many succeeded.
    pub async fn fan_out(&self, task: &Task, notice: &Notice) -> usize {
        let mut delivered = 0;
        for channel in &task.notifications.channels {
            let target = match channel {
                NotificationChannel::Email { address } => address.clone(),
                NotificationChannel::Slack { webhook_url } => redact_url(webhook_url),
                NotificationChannel::Webhook { url } => redact_url(url),
            };
            match self.deliver(channel, notice).await {
                Ok(()) => {
                    delivered += 1;
                    info!(task_id = %task.id, channel = channel.kind(), target = %target, "notification sent");
                }
                Err(e) => {
                    warn!(task_id = %task.id, channel = channel.kind(), target = %target, error = %e, "notification failed");
                }
            }
        }
        if task.notifications.is_empty() {
            debug!(task_id = %task.id, "no notification channels configured");
        }
        delivered
    }
}

#[async_trait]
impl TaskNotifier for Notifier {
    async fn notify_complete(&self, task: &Task, result: &str) {
        let notice = message::completed(task, result, self.public_base_url.as_deref());
        self.fan_out(task, &notice).await;
    }

    async fn notify_failed(&self, task: &Task, error: &str) {
        let notice = message::failed(task, error, self.public_base_url.as_deref());
        self.fan_out(task, &notice).await;
    }

    async fn notify_blocked(&self, task: &Task, reason: &str) {
        let notice = message::blocked(task, reason, self.public_base_url.as_deref());
        self.fan_out(task, &notice).await;
    }
}
