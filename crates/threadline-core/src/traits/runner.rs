// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runner trait for pluggable execution backends.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::capability::RunnerCapabilities;
use crate::error::ThreadlineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AgentMessage, ExecutionContext, ExecutionResult, StreamChunk};

/// A lazy, finite, non-restartable sequence of response chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ThreadlineError>> + Send>>;

/// Scoped acquisition of runner resources for one unit of execution.
///
/// The release callback runs exactly once when the guard is dropped, which
/// covers normal completion, early returns, and errors raised mid-stream.
pub struct RunnerSession {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl RunnerSession {
    /// A session with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// A session that runs `release` when dropped.
    pub fn with_release(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for RunnerSession {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for RunnerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerSession")
            .field("pending_release", &self.release.is_some())
            .finish()
    }
}

/// Execution backend that turns a prompt plus history into a response.
#[async_trait]
pub trait Runner: PluginAdapter {
    /// Returns the capabilities supported by this runner.
    fn capabilities(&self) -> RunnerCapabilities;

    /// Acquires per-execution resources. Hold the guard for the whole call.
    async fn acquire_session(&self) -> Result<RunnerSession, ThreadlineError> {
        Ok(RunnerSession::noop())
    }

    /// Streams the response chunk by chunk.
    ///
    /// Fails with [`ThreadlineError::NotCapable`] when streaming is unsupported.
    async fn execute_streaming(
        &self,
        prompt: &str,
        history: &[AgentMessage],
        context: &ExecutionContext,
    ) -> Result<ChunkStream, ThreadlineError>;

    /// Produces one complete result.
    async fn execute_non_streaming(
        &self,
        prompt: &str,
        history: &[AgentMessage],
        context: &ExecutionContext,
    ) -> Result<ExecutionResult, ThreadlineError>;

    /// Rejects requests that exceed the advertised capabilities before any
    /// execution starts.
    fn validate_execution(
        &self,
        streaming: bool,
        history: &[AgentMessage],
    ) -> Result<(), ThreadlineError> {
        let caps = self.capabilities();
        if streaming && !caps.supports_streaming {
            return Err(ThreadlineError::NotCapable {
                component: format!("runner {}", self.name()),
                capability: "streaming".to_string(),
            });
        }
        if !history.is_empty() && !caps.supports_conversation_history {
            return Err(ThreadlineError::NotCapable {
                component: format!("runner {}", self.name()),
                capability: "conversation history".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn session_releases_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        {
            let _session = RunnerSession::with_release(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn session_releases_on_early_error_path() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();

        fn fails(_guard: RunnerSession) -> Result<(), ThreadlineError> {
            Err(ThreadlineError::execution("boom"))
        }

        let guard = RunnerSession::with_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(fails(guard).is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
