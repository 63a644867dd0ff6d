// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock runner for deterministic testing.
//!
//! `MockRunner` implements `Runner` with scripted responses. Replies are
//! popped from a FIFO queue; when it is empty, `"mock response"` is returned.
//! Streaming replies are split on word boundaries unless explicit chunks are
//! configured.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;

use threadline_core::types::{
    AgentMessage, ExecutionContext, ExecutionResult, StreamChunk, TokenUsage,
};
use threadline_core::{
    AdapterType, ChunkStream, HealthStatus, PluginAdapter, Runner, RunnerCapabilities,
    RunnerSession, ThreadlineError,
};

/// How the runner answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerMode {
    /// Scripted replies.
    Reply,
    /// Every execution fails with an execution error.
    Fail(String),
    /// Every execution reports that it needs user input.
    Blocked(String),
    /// Streams this many chunks, then yields an execution error.
    FailMidStream(usize),
    /// Never answers.
    Hang,
}

/// One recorded execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerCall {
    pub prompt: String,
    pub history: Vec<AgentMessage>,
    pub system_prompt: Option<String>,
    pub streaming: bool,
}

/// A scripted runner.
pub struct MockRunner {
    caps: RunnerCapabilities,
    mode: RunnerMode,
    responses: Mutex<VecDeque<String>>,
    chunks: Option<Vec<String>>,
    delay: Duration,
    calls: Mutex<Vec<RunnerCall>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockRunner {
    /// A non-streaming runner with history and system prompt support.
    pub fn new() -> Self {
        Self {
            caps: RunnerCapabilities {
                supports_streaming: false,
                ..RunnerCapabilities::default()
            },
            mode: RunnerMode::Reply,
            responses: Mutex::new(VecDeque::new()),
            chunks: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A streaming-capable runner.
    pub fn streaming() -> Self {
        Self::new().with_capabilities(RunnerCapabilities::default())
    }

    pub fn with_capabilities(mut self, caps: RunnerCapabilities) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_responses<S: Into<String>>(self, responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    /// Streams exactly these chunks for every streaming call.
    pub fn with_chunks<S: Into<String>>(mut self, chunks: impl IntoIterator<Item = S>) -> Self {
        self.chunks = Some(chunks.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_mode(mut self, mode: RunnerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn failing(self, message: &str) -> Self {
        self.with_mode(RunnerMode::Fail(message.to_string()))
    }

    pub fn blocked(self, reason: &str) -> Self {
        self.with_mode(RunnerMode::Blocked(reason.to_string()))
    }

    pub fn hanging(self) -> Self {
        self.with_mode(RunnerMode::Hang)
    }

    /// Sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn push_response(&self, text: &str) {
        self.responses.lock().await.push_back(text.to_string());
    }

    pub async fn calls(&self) -> Vec<RunnerCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Sessions currently held.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of sessions held at once.
    pub fn peak_sessions(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn next_response(&self) -> String {
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "mock response".to_string())
    }

    async fn record(
        &self,
        prompt: &str,
        history: &[AgentMessage],
        context: &ExecutionContext,
        streaming: bool,
    ) {
        self.calls.lock().await.push(RunnerCall {
            prompt: prompt.to_string(),
            history: history.to_vec(),
            system_prompt: context.system_prompt.clone(),
            streaming,
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn split_words(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl PluginAdapter for MockRunner {
    fn name(&self) -> &str {
        "mock-runner"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Runner
    }

    async fn health_check(&self) -> Result<HealthStatus, ThreadlineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ThreadlineError> {
        Ok(())
    }
}

#[async_trait]
impl Runner for MockRunner {
    fn capabilities(&self) -> RunnerCapabilities {
        self.caps
    }

    async fn acquire_session(&self) -> Result<RunnerSession, ThreadlineError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let active = self.active.clone();
        Ok(RunnerSession::with_release(move || {
            active.fetch_sub(1, Ordering::SeqCst);
        }))
    }

    async fn execute_streaming(
        &self,
        prompt: &str,
        history: &[AgentMessage],
        context: &ExecutionContext,
    ) -> Result<ChunkStream, ThreadlineError> {
        self.validate_execution(true, history)?;
        self.record(prompt, history, context, true).await;
        match &self.mode {
            RunnerMode::Fail(message) => Err(ThreadlineError::execution(message.clone())),
            RunnerMode::Hang => Ok(Box::pin(stream::pending())),
            RunnerMode::Blocked(reason) => {
                let mut chunk = StreamChunk::text(reason.clone());
                chunk.finish_reason = Some("needs_input".into());
                Ok(Box::pin(stream::iter(vec![Ok(chunk)])))
            }
            RunnerMode::Reply | RunnerMode::FailMidStream(_) => {
                let chunks = match &self.chunks {
                    Some(chunks) => chunks.clone(),
                    None => split_words(&self.next_response().await),
                };
                let mut items: Vec<Result<StreamChunk, ThreadlineError>> =
                    chunks.into_iter().map(|c| Ok(StreamChunk::text(c))).collect();
                if let RunnerMode::FailMidStream(after) = self.mode {
                    items.truncate(after);
                    items.push(Err(ThreadlineError::execution("stream interrupted")));
                } else if let Some(Ok(last)) = items.last_mut() {
                    last.finish_reason = Some("end_turn".into());
                }
                Ok(Box::pin(stream::iter(items)))
            }
        }
    }

    async fn execute_non_streaming(
        &self,
        prompt: &str,
        history: &[AgentMessage],
        context: &ExecutionContext,
    ) -> Result<ExecutionResult, ThreadlineError> {
        self.validate_execution(false, history)?;
        self.record(prompt, history, context, false).await;
        match &self.mode {
            RunnerMode::Fail(message) => Err(ThreadlineError::execution(message.clone())),
            RunnerMode::FailMidStream(_) => Err(ThreadlineError::execution("stream interrupted")),
            RunnerMode::Hang => futures::future::pending().await,
            RunnerMode::Blocked(reason) => Ok(ExecutionResult {
                content: reason.clone(),
                finish_reason: Some("needs_input".into()),
                ..Default::default()
            }),
            RunnerMode::Reply => {
                let mut result = ExecutionResult::text(self.next_response().await);
                result.token_usage = Some(TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                });
                Ok(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext::default()
    }

    #[tokio::test]
    async fn queued_responses_returned_in_order() {
        let runner = MockRunner::new().with_responses(["first", "second"]);
        assert_eq!(
            runner.execute_non_streaming("p", &[], &ctx()).await.unwrap().content,
            "first"
        );
        assert_eq!(
            runner.execute_non_streaming("p", &[], &ctx()).await.unwrap().content,
            "second"
        );
        // Queue exhausted, falls back to default
        assert_eq!(
            runner.execute_non_streaming("p", &[], &ctx()).await.unwrap().content,
            "mock response"
        );
        assert_eq!(runner.call_count().await, 3);
    }

    #[tokio::test]
    async fn streaming_splits_on_words() {
        let runner = MockRunner::streaming().with_responses(["hello there world"]);
        let chunks: Vec<_> = runner
            .execute_streaming("p", &[], &ctx())
            .await
            .unwrap()
            .map(|c| c.unwrap().content)
            .collect()
            .await;
        assert_eq!(chunks, vec!["hello ", "there ", "world"]);
    }

    #[tokio::test]
    async fn non_streaming_runner_refuses_to_stream() {
        let runner = MockRunner::new();
        let err = runner.execute_streaming("p", &[], &ctx()).await.err().unwrap();
        assert!(matches!(err, ThreadlineError::NotCapable { .. }));
    }

    #[tokio::test]
    async fn fail_mid_stream_yields_error_after_chunks() {
        let runner = MockRunner::streaming()
            .with_chunks(["a", "b", "c"])
            .with_mode(RunnerMode::FailMidStream(2));
        let items: Vec<_> = runner
            .execute_streaming("p", &[], &ctx())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 3);
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn blocked_mode_reports_needs_input() {
        let runner = MockRunner::new().blocked("Which region?");
        let result = runner.execute_non_streaming("p", &[], &ctx()).await.unwrap();
        assert!(result.is_blocked());
        assert_eq!(result.content, "Which region?");
    }

    #[tokio::test]
    async fn sessions_are_counted_and_released() {
        let runner = MockRunner::new();
        let a = runner.acquire_session().await.unwrap();
        let b = runner.acquire_session().await.unwrap();
        assert_eq!(runner.active_sessions(), 2);
        drop(a);
        drop(b);
        assert_eq!(runner.active_sessions(), 0);
        assert_eq!(runner.peak_sessions(), 2);
    }
}
