// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` and every optional facet, with
//! configurable capabilities. Outbound calls are recorded for assertions.
//! Because every facet accessor returns `Some`, any facet call recorded while
//! its capability flag is `false` exposes a gating bug in the caller.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use threadline_core::types::{
    InteractionResponse, InteractiveMessage, RawRequest, ReceivedMessage, RichMessage,
};
use threadline_core::{
    AdapterType, ChannelAdapter, ChannelCapabilities, ConversationId, HealthStatus,
    InteractiveDelivery, PluginAdapter, ReactionDelivery, RichDelivery, StreamingDelivery,
    ThreadlineError,
};

/// One recorded outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCall {
    Send {
        text: String,
        thread_id: Option<String>,
        metadata: Option<Value>,
    },
    BeginStream {
        message_id: String,
        initial_text: String,
    },
    StreamChunk {
        chunk: String,
        message_id: String,
    },
    FinishStream {
        message_id: String,
    },
    Rich {
        text: String,
        fallback_text: String,
    },
    Interactive {
        text: String,
        buttons: usize,
    },
    AddReaction {
        message_id: String,
        reaction: String,
    },
    RemoveReaction {
        message_id: String,
        reaction: String,
    },
}

impl ChannelCall {
    /// The capability a call depends on, or `None` for plain sends.
    pub fn facet(&self) -> Option<&'static str> {
        match self {
            ChannelCall::Send { .. } => None,
            ChannelCall::BeginStream { .. }
            | ChannelCall::StreamChunk { .. }
            | ChannelCall::FinishStream { .. } => Some("streaming"),
            ChannelCall::Rich { .. } => Some("rich_formatting"),
            ChannelCall::Interactive { .. } => Some("interactive_elements"),
            ChannelCall::AddReaction { .. } | ChannelCall::RemoveReaction { .. } => {
                Some("reactions")
            }
        }
    }
}

/// A mock messaging channel for testing.
///
/// Inbound requests are JSON bodies: `{"text", "user", "thread", "metadata"?}`
/// for messages and `{"conversation_id", "action_id", "value", "user_id"}`
/// for interactions.
pub struct MockChannel {
    name: String,
    caps: ChannelCapabilities,
    accept_requests: bool,
    fail_after: Option<usize>,
    outbound: AtomicUsize,
    next_id: AtomicUsize,
    calls: Mutex<Vec<ChannelCall>>,
}

impl MockChannel {
    /// A plain-text channel named `mock` with no optional facets.
    pub fn new() -> Self {
        Self::with_capabilities("mock", ChannelCapabilities::minimal())
    }

    pub fn named(name: &str) -> Self {
        Self::with_capabilities(name, ChannelCapabilities::minimal())
    }

    pub fn with_capabilities(name: &str, caps: ChannelCapabilities) -> Self {
        Self {
            name: name.to_string(),
            caps,
            accept_requests: true,
            fail_after: None,
            outbound: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A chat-like channel: streaming, reactions, threading, editing.
    pub fn streaming(name: &str) -> Self {
        Self::with_capabilities(
            name,
            ChannelCapabilities {
                supports_streaming: true,
                supports_threading: true,
                supports_reactions: true,
                supports_editing: true,
                ..ChannelCapabilities::minimal()
            },
        )
    }

    /// Every outbound call after the first `n` fails with a channel error.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// `verify_request` returns `false` for every request.
    pub fn rejecting_requests(mut self) -> Self {
        self.accept_requests = false;
        self
    }

    pub async fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().await.clone()
    }

    /// Texts passed to `send_message`, in order.
    pub async fn sent_texts(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                ChannelCall::Send { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn send_count(&self) -> usize {
        self.sent_texts().await.len()
    }

    /// Recorded calls that went through an optional facet.
    pub async fn facet_calls(&self) -> Vec<ChannelCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.facet().is_some())
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.calls.lock().await.clear();
    }

    async fn record(&self, call: ChannelCall) -> Result<(), ThreadlineError> {
        let attempt = self.outbound.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after
            && attempt >= limit
        {
            return Err(ThreadlineError::channel(format!(
                "{}: simulated transport failure",
                self.name
            )));
        }
        self.calls.lock().await.push(call);
        Ok(())
    }

    fn next_message_id(&self) -> String {
        format!("{}-msg-{}", self.name, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn parse_error(&self, message: &str) -> ThreadlineError {
        ThreadlineError::Parse {
            channel: self.name.clone(),
            message: message.to_string(),
        }
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ThreadlineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ThreadlineError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        self.caps
    }

    fn receive_message(&self, request: &RawRequest) -> Result<ReceivedMessage, ThreadlineError> {
        let body = request.json().ok_or_else(|| self.parse_error("body is not JSON"))?;
        let field = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
        Ok(ReceivedMessage {
            content: field("text").ok_or_else(|| self.parse_error("missing text"))?,
            sender_id: field("user").ok_or_else(|| self.parse_error("missing user"))?,
            thread_id: field("thread").ok_or_else(|| self.parse_error("missing thread"))?,
            metadata: body.get("metadata").cloned().unwrap_or_else(|| serde_json::json!({})),
        })
    }

    fn verify_request(&self, _request: &RawRequest) -> bool {
        self.accept_requests
    }

    async fn send_message(
        &self,
        text: &str,
        _conversation_id: &ConversationId,
        thread_id: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<String, ThreadlineError> {
        self.record(ChannelCall::Send {
            text: text.to_string(),
            thread_id: thread_id.map(str::to_string),
            metadata: metadata.cloned(),
        })
        .await?;
        Ok(self.next_message_id())
    }

    fn streaming(&self) -> Option<&dyn StreamingDelivery> {
        Some(self)
    }

    fn rich(&self) -> Option<&dyn RichDelivery> {
        Some(self)
    }

    fn interactive(&self) -> Option<&dyn InteractiveDelivery> {
        Some(self)
    }

    fn reactions(&self) -> Option<&dyn ReactionDelivery> {
        Some(self)
    }
}

#[async_trait]
impl StreamingDelivery for MockChannel {
    async fn begin_stream(
        &self,
        message_id: &str,
        initial_text: &str,
        _metadata: Option<&Value>,
    ) -> Result<(), ThreadlineError> {
        self.record(ChannelCall::BeginStream {
            message_id: message_id.to_string(),
            initial_text: initial_text.to_string(),
        })
        .await
    }

    async fn stream_message_chunk(
        &self,
        chunk: &str,
        message_id: &str,
        _conversation_id: &ConversationId,
        _metadata: Option<&Value>,
    ) -> Result<(), ThreadlineError> {
        self.record(ChannelCall::StreamChunk {
            chunk: chunk.to_string(),
            message_id: message_id.to_string(),
        })
        .await
    }

    async fn finish_stream(&self, message_id: &str) -> Result<(), ThreadlineError> {
        self.calls.lock().await.push(ChannelCall::FinishStream {
            message_id: message_id.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl RichDelivery for MockChannel {
    async fn send_rich_message(
        &self,
        message: &RichMessage,
        _conversation_id: &ConversationId,
        _thread_id: Option<&str>,
        _metadata: Option<&Value>,
    ) -> Result<String, ThreadlineError> {
        self.record(ChannelCall::Rich {
            text: message.text.clone(),
            fallback_text: message.fallback_text.clone(),
        })
        .await?;
        Ok(self.next_message_id())
    }
}

#[async_trait]
impl InteractiveDelivery for MockChannel {
    async fn send_interactive_message(
        &self,
        message: &InteractiveMessage,
        _conversation_id: &ConversationId,
        _thread_id: Option<&str>,
        _metadata: Option<&Value>,
    ) -> Result<String, ThreadlineError> {
        self.record(ChannelCall::Interactive {
            text: message.text.clone(),
            buttons: message.buttons.len(),
        })
        .await?;
        Ok(self.next_message_id())
    }

    fn handle_interaction(
        &self,
        request: &RawRequest,
    ) -> Result<InteractionResponse, ThreadlineError> {
        let body = request.json().ok_or_else(|| self.parse_error("body is not JSON"))?;
        let field = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| self.parse_error(&format!("missing {key}")))
        };
        Ok(InteractionResponse {
            conversation_id: ConversationId::from(field("conversation_id")?),
            action_id: field("action_id")?,
            value: field("value")?,
            user_id: field("user_id")?,
        })
    }
}

#[async_trait]
impl ReactionDelivery for MockChannel {
    async fn add_reaction(
        &self,
        message_id: &str,
        reaction: &str,
        _metadata: Option<&Value>,
    ) -> Result<(), ThreadlineError> {
        self.record(ChannelCall::AddReaction {
            message_id: message_id.to_string(),
            reaction: reaction.to_string(),
        })
        .await
    }

    async fn remove_reaction(
        &self,
        message_id: &str,
        reaction: &str,
        _metadata: Option<&Value>,
    ) -> Result<(), ThreadlineError> {
        self.record(ChannelCall::RemoveReaction {
            message_id: message_id.to_string(),
            reaction: reaction.to_string(),
        })
        .await
    }
}
