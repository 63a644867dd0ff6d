// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API runner for Threadline.
//!
//! Implements [`Runner`] with both single-shot completion and streaming SSE
//! responses. Concurrent executions are bounded by a semaphore whose permit
//! is held in the [`RunnerSession`] guard.

pub mod client;
pub mod sse;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use futures::stream::StreamExt;
use threadline_config::ThreadlineConfig;
use threadline_core::types::{
    AgentMessage, ExecutionContext, ExecutionResult, MessageRole, StreamChunk, TokenUsage,
    ToolCall,
};
use threadline_core::{
    AdapterType, ChunkStream, HealthStatus, PluginAdapter, Runner, RunnerCapabilities,
    RunnerSession, ThreadlineError,
};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::client::AnthropicClient;
use crate::sse::StreamEvent;
use crate::types::{ApiMessage, BlockDelta, MessageRequest, ResponseContentBlock};

/// Key in [`ExecutionContext::additional_params`] that overrides the model.
pub const MODEL_PARAM: &str = "model";

/// Runner backed by the Anthropic Messages API.
pub struct AnthropicRunner {
    client: AnthropicClient,
    default_model: String,
    max_tokens: u32,
    permits: Arc<Semaphore>,
}

impl AnthropicRunner {
    /// Builds the runner from configuration.
    ///
    /// The API key comes from `anthropic.api_key`, falling back to the
    /// `ANTHROPIC_API_KEY` environment variable.
    pub fn new(config: &ThreadlineConfig) -> Result<Self, ThreadlineError> {
        let api_key = resolve_api_key(config.anthropic.api_key.as_deref())?;
        let client = AnthropicClient::new(&api_key, &config.anthropic.api_version)?;
        info!(model = %config.anthropic.default_model, "Anthropic runner initialized");
        Ok(Self::with_client(
            client,
            config.anthropic.default_model.clone(),
            config.anthropic.max_tokens,
            config.anthropic.max_concurrent_requests,
        ))
    }

    pub fn with_client(
        client: AnthropicClient,
        default_model: String,
        max_tokens: u32,
        max_concurrent: usize,
    ) -> Self {
        Self {
            client,
            default_model,
            max_tokens,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    fn to_request(
        &self,
        prompt: &str,
        history: &[AgentMessage],
        context: &ExecutionContext,
    ) -> MessageRequest {
        let model = context
            .additional_params
            .get(MODEL_PARAM)
            .and_then(|v| v.as_str())
            .unwrap_or(self.default_model.as_str())
            .to_string();

        MessageRequest {
            model,
            messages: to_api_messages(history, prompt),
            system: context.system_prompt.clone(),
            max_tokens: context.max_tokens.unwrap_or(self.max_tokens),
            temperature: context.temperature,
            stream: false,
        }
    }
}

/// Converts history plus the new prompt into API turns.
///
/// The API requires alternating user/assistant turns starting with a user
/// turn, so consecutive same-role messages are merged and a leading
/// assistant turn is dropped. System and tool messages are not sent as turns.
fn to_api_messages(history: &[AgentMessage], prompt: &str) -> Vec<ApiMessage> {
    let turns = history
        .iter()
        .filter_map(|m| match m.role {
            MessageRole::User => Some(("user", m.content.as_str())),
            MessageRole::Assistant => Some(("assistant", m.content.as_str())),
            MessageRole::System | MessageRole::Tool => None,
        })
        .chain(std::iter::once(("user", prompt)));

    let mut messages: Vec<ApiMessage> = Vec::new();
    for (role, content) in turns {
        if content.is_empty() {
            continue;
        }
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(content);
            }
            None if role == "assistant" => {}
            _ => messages.push(ApiMessage {
                role: role.to_string(),
                content: content.to_string(),
            }),
        }
    }
    messages
}

/// Maps Anthropic stop reasons onto the runner vocabulary.
fn map_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" | "stop_sequence" => "stop",
        "max_tokens" => "length",
        "tool_use" => "tool_calls",
        other => other,
    }
    .to_string()
}

/// Accumulates tool-use input across deltas while a stream is decoded.
#[derive(Default)]
struct StreamState {
    tool: Option<(usize, String, String, String)>,
}

fn map_stream_event(
    state: &mut StreamState,
    event: StreamEvent,
) -> Option<Result<StreamChunk, ThreadlineError>> {
    match event {
        StreamEvent::ContentBlockStart {
            index,
            content_block: ResponseContentBlock::ToolUse { id, name, .. },
        } => {
            state.tool = Some((index, id, name, String::new()));
            None
        }
        StreamEvent::ContentBlockDelta { delta, .. } => match delta {
            BlockDelta::TextDelta { text } => Some(Ok(StreamChunk::text(text))),
            BlockDelta::InputJsonDelta { partial_json } => {
                if let Some((_, _, _, input)) = state.tool.as_mut() {
                    input.push_str(&partial_json);
                }
                None
            }
            BlockDelta::Other => None,
        },
        StreamEvent::ContentBlockStop { index: stopped } => {
            let (index, id, name, input) = state.tool.take()?;
            if index != stopped {
                state.tool = Some((index, id, name, input));
                return None;
            }
            let arguments = serde_json::from_str(&input).unwrap_or(serde_json::Value::Null);
            Some(Ok(StreamChunk {
                tool_calls: vec![ToolCall {
                    id,
                    name,
                    arguments,
                }],
                ..StreamChunk::default()
            }))
        }
        StreamEvent::MessageDelta { delta, usage } => delta.stop_reason.map(|reason| {
            Ok(StreamChunk {
                finish_reason: Some(map_stop_reason(&reason)),
                metadata: usage.map(|u| serde_json::json!({"output_tokens": u.output_tokens})),
                ..StreamChunk::default()
            })
        }),
        StreamEvent::Error { error } => Some(Err(ThreadlineError::execution(format!(
            "stream error ({}): {}",
            error.kind, error.message
        )))),
        _ => None,
    }
}

fn resolve_api_key(config_key: Option<&str>) -> Result<String, ThreadlineError> {
    if let Some(key) = config_key.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(ThreadlineError::Config(
            "Anthropic API key not found: set anthropic.api_key or ANTHROPIC_API_KEY".into(),
        )),
    }
}

#[async_trait]
impl PluginAdapter for AnthropicRunner {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Runner
    }

    async fn health_check(&self) -> Result<HealthStatus, ThreadlineError> {
        if self.permits.available_permits() == 0 {
            return Ok(HealthStatus::Degraded("all request slots busy".into()));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ThreadlineError> {
        self.permits.close();
        Ok(())
    }
}

#[async_trait]
impl Runner for AnthropicRunner {
    fn capabilities(&self) -> RunnerCapabilities {
        RunnerCapabilities {
            supports_streaming: true,
            supports_tool_use: false,
            supports_vision: false,
            supports_system_prompt_override: true,
            supports_conversation_history: true,
            context_window: Some(200_000),
            max_output_tokens: Some(self.max_tokens),
        }
    }

    async fn acquire_session(&self) -> Result<RunnerSession, ThreadlineError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ThreadlineError::execution("runner is shut down"))?;
        Ok(RunnerSession::with_release(move || drop(permit)))
    }

    async fn execute_streaming(
        &self,
        prompt: &str,
        history: &[AgentMessage],
        context: &ExecutionContext,
    ) -> Result<ChunkStream, ThreadlineError> {
        self.validate_execution(true, history)?;
        let request = self.to_request(prompt, history, context);
        debug!(model = %request.model, turns = request.messages.len(), "streaming execution");
        let events = self.client.stream_message(&request).await?;

        let chunks = events
            .scan(StreamState::default(), |state, event| {
                let mapped = match event {
                    Ok(event) => map_stream_event(state, event),
                    Err(e) => Some(Err(e)),
                };
                future::ready(Some(mapped))
            })
            .filter_map(future::ready);
        Ok(Box::pin(chunks))
    }

    async fn execute_non_streaming(
        &self,
        prompt: &str,
        history: &[AgentMessage],
        context: &ExecutionContext,
    ) -> Result<ExecutionResult, ThreadlineError> {
        self.validate_execution(false, history)?;
        let request = self.to_request(prompt, history, context);
        debug!(model = %request.model, turns = request.messages.len(), "non-streaming execution");
        let response = self.client.complete_message(&request).await?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ResponseContentBlock::Text { text } => content.push_str(&text),
                ResponseContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ResponseContentBlock::Other => {}
            }
        }

        Ok(ExecutionResult {
            content,
            tool_calls,
            finish_reason: response.stop_reason.as_deref().map(map_stop_reason),
            token_usage: Some(TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            }),
            metadata: Some(serde_json::json!({"model": response.model, "id": response.id})),
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn runner(uri: &str, max_concurrent: usize) -> AnthropicRunner {
        let client = AnthropicClient::new("k", "2023-06-01")
            .unwrap()
            .with_base_url(uri);
        AnthropicRunner::with_client(client, "claude-test".into(), 512, max_concurrent)
    }

    fn msg(role: MessageRole, content: &str) -> AgentMessage {
        AgentMessage {
            role,
            content: content.into(),
            tool_calls: vec![],
        }
    }

    #[test]
    fn history_is_normalized_to_alternating_turns() {
        let history = vec![
            msg(MessageRole::Assistant, "stray greeting"),
            msg(MessageRole::User, "first"),
            msg(MessageRole::User, "second"),
            msg(MessageRole::System, "ignored"),
            msg(MessageRole::Assistant, "reply"),
        ];
        let messages = to_api_messages(&history, "now");
        let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["user", "assistant", "user"]);
        assert_eq!(messages[0].content, "first\n\nsecond");
        assert_eq!(messages[2].content, "now");
    }

    #[test]
    fn api_key_prefers_config() {
        assert_eq!(resolve_api_key(Some("sk-ant-config")).unwrap(), "sk-ant-config");
    }

    #[test]
    fn tool_use_input_accumulates_until_block_stop() {
        let mut state = StreamState::default();
        let start = StreamEvent::ContentBlockStart {
            index: 1,
            content_block: ResponseContentBlock::ToolUse {
                id: "tu_1".into(),
                name: "lookup".into(),
                input: serde_json::json!({}),
            },
        };
        assert!(map_stream_event(&mut state, start).is_none());
        for part in [r#"{"q":"#, r#""rust"}"#] {
            let delta = StreamEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: part.into(),
                },
            };
            assert!(map_stream_event(&mut state, delta).is_none());
        }
        let chunk = map_stream_event(&mut state, StreamEvent::ContentBlockStop { index: 1 })
            .unwrap()
            .unwrap();
        assert_eq!(chunk.tool_calls[0].arguments, serde_json::json!({"q": "rust"}));
    }

    #[tokio::test]
    async fn non_streaming_maps_content_and_stop_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-test",
                "system": "be brief",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "content": [{"type": "text", "text": "Hello "}, {"type": "text", "text": "there"}],
                "model": "claude-test",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 7, "output_tokens": 2}
            })))
            .mount(&server)
            .await;

        let context = ExecutionContext {
            system_prompt: Some("be brief".into()),
            ..ExecutionContext::default()
        };
        let result = runner(&server.uri(), 2)
            .execute_non_streaming("hi", &[], &context)
            .await
            .unwrap();
        assert_eq!(result.content, "Hello there");
        assert_eq!(result.finish_reason.as_deref(), Some("stop"));
        assert_eq!(result.token_usage.unwrap().input_tokens, 7);
    }

    #[tokio::test]
    async fn streaming_yields_text_then_finish() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"m\",\"content\":[],\"model\":\"claude-test\",\"stop_reason\":null,\"usage\":{\"input_tokens\":3}}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"you\"}}\n\n",
            "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"max_tokens\"},\"usage\":{\"output_tokens\":2}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let chunks: Vec<StreamChunk> = runner(&server.uri(), 2)
            .execute_streaming("hi", &[], &ExecutionContext::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let text: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(text, "Hi you");
        assert_eq!(chunks.last().unwrap().finish_reason.as_deref(), Some("length"));
    }

    #[tokio::test]
    async fn sessions_are_bounded_and_released_on_drop() {
        let runner = runner("http://127.0.0.1:9", 1);
        let first = runner.acquire_session().await.unwrap();
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            runner.acquire_session(),
        )
        .await;
        assert!(pending.is_err(), "second session must wait for the first");

        drop(first);
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            runner.acquire_session(),
        )
        .await;
        assert!(second.is_ok());
    }
}
