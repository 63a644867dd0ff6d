// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution orchestrator.
//!
//! Drives a [`Runner`] for one conversation turn and persists both sides of
//! the exchange. Three entry points share the same skeleton:
//!
//! - [`Orchestrator::run_interactive`] hands a chunk stream to an API caller;
//! - [`Orchestrator::run_background`] runs a task prompt to completion;
//! - [`Orchestrator::run_with_channel`] relays the reply through a channel
//!   adapter, streaming when both the adapter and the runner can.
//!
//! Every runner interaction, from session acquisition to the last chunk, is
//! bounded by one deadline. The runner session guard lives until the turn
//! ends on every path.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use threadline_config::model::AgentConfig;
use threadline_core::types::{
    AgentMessage, Conversation, ExecutionContext, ExecutionResult, Message, MessageRole,
    StreamChunk, TaskStatus,
};
use threadline_core::{
    ChannelAdapter, ChunkStream, ConversationId, Runner, RunnerSession, StorageAdapter,
    StreamingDelivery, ThreadlineError,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dispatch;
use crate::prompt::channel_system_prompt;

/// Reaction added to a streamed reply once it is complete.
pub const COMPLETION_REACTION: &str = "white_check_mark";

/// Tunables for [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub runner_timeout: Duration,
    pub history_limit: i64,
    pub base_system_prompt: String,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            runner_timeout: Duration::from_secs(config.runner_timeout_secs),
            history_limit: config.history_limit,
            base_system_prompt: config.base_system_prompt.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// A fixed point in time by which a turn must finish.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn start(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    fn expired(&self) -> ThreadlineError {
        ThreadlineError::Timeout {
            duration: self.budget,
        }
    }

    async fn run<T>(
        &self,
        fut: impl Future<Output = Result<T, ThreadlineError>>,
    ) -> Result<T, ThreadlineError> {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| self.expired())?
    }

    async fn next(&self, stream: &mut ChunkStream) -> Result<Option<StreamChunk>, ThreadlineError> {
        match tokio::time::timeout_at(self.at, stream.next()).await {
            Ok(Some(item)) => item.map(Some),
            Ok(None) => Ok(None),
            Err(_) => Err(self.expired()),
        }
    }
}

/// Drives runners for conversations.
pub struct Orchestrator {
    runner: Arc<dyn Runner>,
    storage: Arc<dyn StorageAdapter>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn Runner>,
        storage: Arc<dyn StorageAdapter>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            runner,
            storage,
            settings,
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn runner(&self) -> &Arc<dyn Runner> {
        &self.runner
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Interactive turn for an API caller.
    ///
    /// Persists `user_message`, then returns the runner's chunk stream, or a
    /// single-chunk stream when the runner cannot stream. The caller is
    /// responsible for persisting the reply; [`Orchestrator::record_reply`]
    /// wraps a stream to do that.
    pub async fn run_interactive(
        &self,
        conversation_id: &ConversationId,
        user_message: &str,
    ) -> Result<ChunkStream, ThreadlineError> {
        self.require_conversation(conversation_id).await?;
        self.storage
            .insert_message(&Message::new(conversation_id, MessageRole::User, user_message))
            .await?;
        self.resume_blocked_task(conversation_id).await;

        let history = self.history(conversation_id, user_message).await?;
        let context = self.context(conversation_id, self.base_prompt());
        let deadline = Deadline::start(self.settings.runner_timeout);
        let session = deadline.run(self.runner.acquire_session()).await?;

        if self.runner.capabilities().supports_streaming {
            self.runner.validate_execution(true, &history)?;
            let inner = deadline
                .run(self.runner.execute_streaming(user_message, &history, &context))
                .await?;
            debug!(conversation_id = %conversation_id, "interactive turn streaming");
            Ok(guarded(inner, session, deadline))
        } else {
            self.runner.validate_execution(false, &history)?;
            let result = deadline
                .run(self.runner.execute_non_streaming(user_message, &history, &context))
                .await?;
            drop(session);
            let mut chunk = StreamChunk::text(result.content);
            chunk.finish_reason = result.finish_reason;
            Ok(Box::pin(futures::stream::iter([Ok(chunk)])))
        }
    }

    /// Wraps an interactive stream so the concatenated reply is persisted
    /// when it ends. A stream that ends in an error persists what was
    /// produced, tagged incomplete.
    pub fn record_reply(
        self: &Arc<Self>,
        conversation_id: &ConversationId,
        stream: ChunkStream,
    ) -> ChunkStream {
        struct Recording {
            inner: ChunkStream,
            text: String,
            orchestrator: Arc<Orchestrator>,
            conversation_id: ConversationId,
            done: bool,
        }

        let state = Recording {
            inner: stream,
            text: String::new(),
            orchestrator: self.clone(),
            conversation_id: conversation_id.clone(),
            done: false,
        };
        Box::pin(futures::stream::unfold(state, |mut st| async move {
            if st.done {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    st.text.push_str(&chunk.content);
                    Some((Ok(chunk), st))
                }
                Some(Err(e)) => {
                    st.done = true;
                    st.orchestrator
                        .persist_partial(&st.conversation_id, None, None, &st.text, &e)
                        .await;
                    Some((Err(e), st))
                }
                None => {
                    let reply = Message::new(&st.conversation_id, MessageRole::Assistant, &st.text);
                    if let Err(e) = st.orchestrator.storage.insert_message(&reply).await {
                        warn!(conversation_id = %st.conversation_id, error = %e, "failed to persist reply");
                    }
                    None
                }
            }
        }))
    }

    /// Runs an interactive turn to completion and returns the reply text.
    pub async fn collect_interactive(
        self: &Arc<Self>,
        conversation_id: &ConversationId,
        user_message: &str,
    ) -> Result<String, ThreadlineError> {
        let stream = self.run_interactive(conversation_id, user_message).await?;
        let mut stream = self.record_reply(conversation_id, stream);
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?.content);
        }
        Ok(text)
    }

    /// Background turn: persists `prompt`, runs the runner without
    /// streaming, persists the result, and returns it.
    pub async fn run_background(
        &self,
        conversation_id: &ConversationId,
        prompt: &str,
    ) -> Result<ExecutionResult, ThreadlineError> {
        self.require_conversation(conversation_id).await?;
        self.storage
            .insert_message(&Message::new(conversation_id, MessageRole::User, prompt))
            .await?;

        let history = self.history(conversation_id, prompt).await?;
        let context = self.context(conversation_id, self.base_prompt());
        let deadline = Deadline::start(self.settings.runner_timeout);
        let _session = deadline.run(self.runner.acquire_session()).await?;
        self.runner.validate_execution(false, &history)?;
        let result = deadline
            .run(self.runner.execute_non_streaming(prompt, &history, &context))
            .await?;

        let mut reply = Message::new(conversation_id, MessageRole::Assistant, &result.content);
        if let Some(reason) = &result.finish_reason {
            reply = reply.with_metadata(json!({ "finish_reason": reason }));
        }
        self.storage.insert_message(&reply).await?;
        if let Some(usage) = &result.token_usage {
            info!(
                conversation_id = %conversation_id,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "background turn complete"
            );
        }
        Ok(result)
    }

    /// Channel turn: runs the runner with a channel-aware system prompt and
    /// relays the reply through `adapter`.
    ///
    /// The user message is expected to be persisted already by the inbound
    /// path. Returns the full reply text.
    pub async fn run_with_channel(
        &self,
        conversation_id: &ConversationId,
        user_message: &str,
        adapter: &dyn ChannelAdapter,
        thread_id: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<String, ThreadlineError> {
        let caps = adapter.capabilities();
        let system_prompt = channel_system_prompt(&self.settings.base_system_prompt, &caps);
        let history = self.history(conversation_id, user_message).await?;
        let context = self.context(conversation_id, Some(system_prompt));
        let deadline = Deadline::start(self.settings.runner_timeout);
        let _session = deadline.run(self.runner.acquire_session()).await?;

        let turn = ChannelTurn {
            conversation_id,
            user_message,
            adapter,
            thread_id,
            metadata,
            history: &history,
            context: &context,
            deadline,
        };
        match dispatch::channel_streaming(adapter) {
            Some(streaming) if self.runner.capabilities().supports_streaming => {
                self.relay_stream(turn, streaming).await
            }
            _ => self.relay_batch(turn).await,
        }
    }

    async fn relay_stream(
        &self,
        turn: ChannelTurn<'_>,
        streaming: &dyn StreamingDelivery,
    ) -> Result<String, ThreadlineError> {
        let ChannelTurn {
            conversation_id,
            user_message,
            adapter,
            thread_id,
            metadata,
            history,
            context,
            deadline,
        } = turn;
        self.runner.validate_execution(true, history)?;
        let mut stream = deadline
            .run(self.runner.execute_streaming(user_message, history, context))
            .await?;

        let mut text = String::new();
        let mut message_id: Option<String> = None;
        loop {
            let chunk = match deadline.next(&mut stream).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    release_stream(streaming, adapter.name(), message_id.as_deref()).await;
                    self.persist_partial(conversation_id, Some(adapter.name()), message_id, &text, &e)
                        .await;
                    return Err(e);
                }
            };
            if chunk.content.is_empty() {
                continue;
            }
            text.push_str(&chunk.content);

            let delivered = match &message_id {
                None => match adapter
                    .send_message(&chunk.content, conversation_id, thread_id, metadata)
                    .await
                {
                    Ok(id) => {
                        let begun = streaming.begin_stream(&id, &chunk.content, metadata).await;
                        message_id = Some(id);
                        begun
                    }
                    Err(e) => Err(e),
                },
                Some(id) => {
                    streaming
                        .stream_message_chunk(&chunk.content, id, conversation_id, metadata)
                        .await
                }
            };
            if let Err(e) = delivered {
                warn!(
                    conversation_id = %conversation_id,
                    channel = adapter.name(),
                    error = %e,
                    "channel transport failed mid-stream"
                );
                drop(stream);
                release_stream(streaming, adapter.name(), message_id.as_deref()).await;
                self.persist_partial(conversation_id, Some(adapter.name()), message_id, &text, &e)
                    .await;
                return Err(e);
            }
        }

        if let Some(id) = &message_id {
            if let Err(e) = streaming.finish_stream(id).await {
                warn!(channel = adapter.name(), error = %e, "failed to finish stream");
            }
            if let Some(reactions) = dispatch::channel_reactions(adapter)
                && let Err(e) = reactions.add_reaction(id, COMPLETION_REACTION, metadata).await
            {
                warn!(channel = adapter.name(), error = %e, "failed to add completion reaction");
            }
        }

        let reply = Message::new(conversation_id, MessageRole::Assistant, &text)
            .with_provenance(adapter.name(), message_id);
        self.storage.insert_message(&reply).await?;
        debug!(conversation_id = %conversation_id, channel = adapter.name(), "streamed reply delivered");
        Ok(text)
    }

    async fn relay_batch(&self, turn: ChannelTurn<'_>) -> Result<String, ThreadlineError> {
        let ChannelTurn {
            conversation_id,
            user_message,
            adapter,
            thread_id,
            metadata,
            history,
            context,
            deadline,
        } = turn;
        self.runner.validate_execution(false, history)?;
        let result = deadline
            .run(self.runner.execute_non_streaming(user_message, history, context))
            .await?;

        match adapter
            .send_message(&result.content, conversation_id, thread_id, metadata)
            .await
        {
            Ok(id) => {
                let reply = Message::new(conversation_id, MessageRole::Assistant, &result.content)
                    .with_provenance(adapter.name(), Some(id));
                self.storage.insert_message(&reply).await?;
                debug!(conversation_id = %conversation_id, channel = adapter.name(), "reply delivered");
                Ok(result.content)
            }
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    channel = adapter.name(),
                    error = %e,
                    "channel transport failed"
                );
                self.persist_partial(conversation_id, Some(adapter.name()), None, &result.content, &e)
                    .await;
                Err(e)
            }
        }
    }

    /// Returns a blocked task behind this conversation to `pending`.
    ///
    /// Called when the user answers on the conversation. Failures are logged.
    pub async fn resume_blocked_task(&self, conversation_id: &ConversationId) -> bool {
        let task = match self.storage.get_task_by_conversation(conversation_id).await {
            Ok(Some(task)) if task.status == TaskStatus::Blocked => task,
            Ok(_) => return false,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "failed to look up task");
                return false;
            }
        };
        match self.storage.resume_blocked_task(&task.id).await {
            Ok(resumed) => {
                if resumed {
                    info!(task_id = %task.id, conversation_id = %conversation_id, "blocked task resumed");
                }
                resumed
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "failed to resume blocked task");
                false
            }
        }
    }

    async fn require_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Conversation, ThreadlineError> {
        self.storage
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| ThreadlineError::not_found("conversation", conversation_id.as_str()))
    }

    /// Recent turns for the runner, without the prompt being answered.
    ///
    /// Runners without history support get an empty history.
    async fn history(
        &self,
        conversation_id: &ConversationId,
        prompt: &str,
    ) -> Result<Vec<AgentMessage>, ThreadlineError> {
        if !self.runner.capabilities().supports_conversation_history
            || self.settings.history_limit <= 0
        {
            return Ok(Vec::new());
        }
        let mut messages = self
            .storage
            .get_recent_messages(conversation_id, self.settings.history_limit + 1)
            .await?;
        if messages
            .last()
            .is_some_and(|m| m.role == MessageRole::User && m.content == prompt)
        {
            messages.pop();
        }
        let skip = messages
            .len()
            .saturating_sub(self.settings.history_limit as usize);
        Ok(messages[skip..].iter().map(AgentMessage::from).collect())
    }

    fn base_prompt(&self) -> Option<String> {
        let base = self.settings.base_system_prompt.trim();
        (!base.is_empty()).then(|| base.to_string())
    }

    fn context(
        &self,
        conversation_id: &ConversationId,
        system_prompt: Option<String>,
    ) -> ExecutionContext {
        let system_prompt = system_prompt
            .filter(|_| self.runner.capabilities().supports_system_prompt_override);
        ExecutionContext {
            conversation_id: Some(conversation_id.clone()),
            system_prompt,
            ..Default::default()
        }
    }

    /// Persists an abandoned reply tagged `incomplete`. Storage failures are
    /// logged so the original error reaches the caller.
    async fn persist_partial(
        &self,
        conversation_id: &ConversationId,
        adapter_name: Option<&str>,
        message_id: Option<String>,
        text: &str,
        cause: &ThreadlineError,
    ) {
        if text.is_empty() {
            return;
        }
        let mut reply = Message::new(conversation_id, MessageRole::Assistant, text)
            .with_metadata(json!({ "incomplete": true, "error": cause.to_string() }));
        if let Some(adapter_name) = adapter_name {
            reply = reply.with_provenance(adapter_name, message_id);
        }
        if let Err(e) = self.storage.insert_message(&reply).await {
            warn!(conversation_id = %conversation_id, error = %e, "failed to persist partial reply");
        }
    }
}

/// Inputs shared by the streaming and batch channel paths.
struct ChannelTurn<'a> {
    conversation_id: &'a ConversationId,
    user_message: &'a str,
    adapter: &'a dyn ChannelAdapter,
    thread_id: Option<&'a str>,
    metadata: Option<&'a Value>,
    history: &'a [AgentMessage],
    context: &'a ExecutionContext,
    deadline: Deadline,
}

/// Holds the runner session and enforces the deadline for the lifetime of
/// an interactive stream.
fn guarded(inner: ChunkStream, session: RunnerSession, deadline: Deadline) -> ChunkStream {
    Box::pin(futures::stream::unfold(
        Some((inner, session)),
        move |state| async move {
            let (mut inner, session) = state?;
            match tokio::time::timeout_at(deadline.at, inner.next()).await {
                Ok(Some(item)) => Some((item, Some((inner, session)))),
                Ok(None) => None,
                Err(_) => Some((Err(deadline.expired()), None)),
            }
        },
    ))
}

/// Releases the adapter's state for a stream that will not complete.
async fn release_stream(streaming: &dyn StreamingDelivery, channel: &str, message_id: Option<&str>) {
    let Some(id) = message_id else { return };
    if let Err(e) = streaming.finish_stream(id).await {
        warn!(channel, message_id = id, error = %e, "failed to release abandoned stream");
    }
}
