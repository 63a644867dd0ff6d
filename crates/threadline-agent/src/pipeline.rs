// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound channel pipeline.
//!
//! Every webhook goes through the same sequence: the adapter verifies the
//! request, parses it, the identity resolver finds the conversation, the user
//! turn is persisted, and the reply is produced on a spawned task. Nothing is
//! written before verification passes.

use std::sync::Arc;

use serde_json::{Value, json};
use threadline_core::types::{Message, MessageRole, RawRequest};
use threadline_core::{ChannelAdapter, ConversationId, ThreadlineError};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::dispatch;
use crate::identity::ConversationResolver;
use crate::orchestrator::Orchestrator;
use crate::registry::ChannelRegistry;

/// What the pipeline did with a verified request.
#[derive(Debug)]
pub enum InboundOutcome {
    /// A URL-verification handshake; the challenge must be echoed back.
    Challenge(String),
    /// The turn was persisted and a reply is being produced.
    Dispatched {
        conversation_id: ConversationId,
        reply: JoinHandle<Result<String, ThreadlineError>>,
    },
}

impl InboundOutcome {
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::Challenge(_) => None,
            Self::Dispatched {
                conversation_id, ..
            } => Some(conversation_id),
        }
    }
}

/// Routes inbound channel traffic to the orchestrator.
pub struct InboundPipeline {
    registry: Arc<ChannelRegistry>,
    resolver: ConversationResolver,
    orchestrator: Arc<Orchestrator>,
    tracker: TaskTracker,
}

impl InboundPipeline {
    pub fn new(registry: Arc<ChannelRegistry>, orchestrator: Arc<Orchestrator>) -> Self {
        let resolver = ConversationResolver::new(orchestrator.storage().clone());
        Self {
            registry,
            resolver,
            orchestrator,
            tracker: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &ConversationResolver {
        &self.resolver
    }

    /// Tracks every spawned reply so shutdown can wait for them.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Handles an inbound event webhook for `adapter_name`.
    pub async fn handle_event(
        &self,
        adapter_name: &str,
        request: &RawRequest,
    ) -> Result<InboundOutcome, ThreadlineError> {
        let adapter = self.verified(adapter_name, request)?;

        if let Some(challenge) = request.json().as_ref().and_then(url_verification_challenge) {
            debug!(adapter = adapter_name, "answering url verification");
            return Ok(InboundOutcome::Challenge(challenge));
        }

        let received = adapter.receive_message(request)?;
        let conversation_id = self
            .resolver
            .resolve_or_create(
                adapter_name,
                &received.thread_id,
                &received.sender_id,
                &received.metadata,
            )
            .await?;

        let user_turn = Message::new(&conversation_id, MessageRole::User, &received.content)
            .with_provenance(adapter_name, None)
            .with_metadata(received.metadata.clone());
        self.orchestrator.storage().insert_message(&user_turn).await?;
        self.orchestrator.resume_blocked_task(&conversation_id).await;

        info!(
            adapter = adapter_name,
            conversation_id = %conversation_id,
            sender = %received.sender_id,
            "inbound message accepted"
        );
        let reply = self.dispatch(
            adapter,
            conversation_id.clone(),
            received.content,
            received.thread_id,
            received.metadata,
        );
        Ok(InboundOutcome::Dispatched {
            conversation_id,
            reply,
        })
    }

    /// Handles an interaction callback (button click) for `adapter_name`.
    ///
    /// The chosen value becomes the user's next turn on the mapped thread.
    pub async fn handle_interaction(
        &self,
        adapter_name: &str,
        request: &RawRequest,
    ) -> Result<InboundOutcome, ThreadlineError> {
        let adapter = self.verified(adapter_name, request)?;
        let interactive =
            dispatch::channel_interactive(adapter.as_ref()).ok_or_else(|| ThreadlineError::NotCapable {
                component: adapter_name.to_string(),
                capability: "interactive_elements".into(),
            })?;
        let response = interactive.handle_interaction(request)?;

        let conversation_id = response.conversation_id.clone();
        let mapping = self
            .resolver
            .lookup(&conversation_id, adapter_name)
            .await?
            .ok_or_else(|| ThreadlineError::not_found("channel mapping", conversation_id.as_str()))?;

        let user_turn = Message::new(&conversation_id, MessageRole::User, &response.value)
            .with_provenance(adapter_name, None)
            .with_metadata(json!({
                "action_id": response.action_id,
                "user_id": response.user_id,
            }));
        self.orchestrator.storage().insert_message(&user_turn).await?;
        self.orchestrator.resume_blocked_task(&conversation_id).await;

        info!(
            adapter = adapter_name,
            conversation_id = %conversation_id,
            action_id = %response.action_id,
            "interaction accepted"
        );
        let reply = self.dispatch(
            adapter,
            conversation_id.clone(),
            response.value,
            mapping.thread_id,
            mapping.metadata,
        );
        Ok(InboundOutcome::Dispatched {
            conversation_id,
            reply,
        })
    }

    /// Sends `text` to the thread `conversation_id` is mapped to on
    /// `adapter_name`, and records it as an assistant turn.
    pub async fn send_to_adapter(
        &self,
        conversation_id: &ConversationId,
        adapter_name: &str,
        text: &str,
    ) -> Result<String, ThreadlineError> {
        let adapter = self.registry.get(adapter_name)?;
        let mapping = self
            .resolver
            .lookup(conversation_id, adapter_name)
            .await?
            .ok_or_else(|| ThreadlineError::not_found("channel mapping", conversation_id.as_str()))?;

        let message_id = adapter
            .send_message(
                text,
                conversation_id,
                Some(&mapping.thread_id),
                Some(&mapping.metadata),
            )
            .await?;
        let record = Message::new(conversation_id, MessageRole::Assistant, text)
            .with_provenance(adapter_name, Some(message_id.clone()));
        self.orchestrator.storage().insert_message(&record).await?;
        Ok(message_id)
    }

    fn verified(
        &self,
        adapter_name: &str,
        request: &RawRequest,
    ) -> Result<Arc<dyn ChannelAdapter>, ThreadlineError> {
        let adapter = self.registry.get(adapter_name)?;
        if !adapter.verify_request(request) {
            warn!(adapter = adapter_name, "request verification failed");
            return Err(ThreadlineError::Security(format!(
                "{adapter_name} request failed verification"
            )));
        }
        Ok(adapter)
    }

    fn dispatch(
        &self,
        adapter: Arc<dyn ChannelAdapter>,
        conversation_id: ConversationId,
        text: String,
        thread_id: String,
        metadata: Value,
    ) -> JoinHandle<Result<String, ThreadlineError>> {
        let orchestrator = self.orchestrator.clone();
        self.tracker.spawn(async move {
            let result = orchestrator
                .run_with_channel(
                    &conversation_id,
                    &text,
                    adapter.as_ref(),
                    Some(&thread_id),
                    Some(&metadata),
                )
                .await;
            if let Err(e) = &result {
                error!(
                    adapter = adapter.name(),
                    conversation_id = %conversation_id,
                    error = %e,
                    "channel reply failed"
                );
            }
            result
        })
    }
}

/// Returns the challenge of a `url_verification` handshake body.
fn url_verification_challenge(body: &Value) -> Option<String> {
    (body.get("type").and_then(Value::as_str) == Some("url_verification"))
        .then(|| body.get("challenge").and_then(Value::as_str).map(str::to_string))
        .flatten()
}
