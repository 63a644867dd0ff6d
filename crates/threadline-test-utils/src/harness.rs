// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete orchestration stack with mock
//! adapters, a temp SQLite database, the cron scheduler, and a recording
//! notifier. `send_event()` drives the inbound channel path and
//! `drain_queue()` runs queued task jobs to completion.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use threadline_agent::{
    ChannelRegistry, ChannelRegistryBuilder, InboundOutcome, InboundPipeline, JobResult,
    Orchestrator, OrchestratorSettings, TaskManager, TaskWorker,
};
use threadline_core::types::RawRequest;
use threadline_core::{ConversationId, PluginAdapter, StorageAdapter, ThreadlineError};
use threadline_cron::CronScheduler;
use threadline_storage::SqliteStorage;

use crate::mock_channel::MockChannel;
use crate::mock_runner::MockRunner;
use crate::notifier::RecordingNotifier;

/// Queue used by harness task jobs.
pub const TEST_QUEUE: &str = "tasks";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    runner: Option<MockRunner>,
    channels: Vec<MockChannel>,
    runner_timeout: Duration,
    history_limit: i64,
    base_system_prompt: String,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            runner: None,
            channels: Vec::new(),
            runner_timeout: Duration::from_secs(5),
            history_limit: 20,
            base_system_prompt: "You are a test assistant.".to_string(),
        }
    }

    /// Use this runner instead of a default non-streaming [`MockRunner`].
    pub fn with_runner(mut self, runner: MockRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Register a channel. Without any, a plain channel named `mock` is used.
    pub fn with_channel(mut self, channel: MockChannel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_runner_timeout(mut self, timeout: Duration) -> Self {
        self.runner_timeout = timeout;
        self
    }

    pub fn with_history_limit(mut self, limit: i64) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.base_system_prompt = prompt.to_string();
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ThreadlineError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ThreadlineError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(SqliteStorage::open(&db_path.to_string_lossy()).await?);

        let runner = Arc::new(self.runner.unwrap_or_default());

        let mut channels = BTreeMap::new();
        let mut builder = ChannelRegistryBuilder::new();
        let configured = if self.channels.is_empty() {
            vec![MockChannel::new()]
        } else {
            self.channels
        };
        for channel in configured {
            let channel = Arc::new(channel);
            builder.register(channel.clone())?;
            channels.insert(channel.name().to_string(), channel);
        }
        let registry = builder.build();

        let orchestrator = Arc::new(Orchestrator::new(
            runner.clone(),
            storage.clone(),
            OrchestratorSettings {
                runner_timeout: self.runner_timeout,
                history_limit: self.history_limit,
                base_system_prompt: self.base_system_prompt,
            },
        ));
        let pipeline = Arc::new(InboundPipeline::new(registry.clone(), orchestrator.clone()));

        let scheduler = Arc::new(CronScheduler::new(Duration::from_secs(1)));
        let notifier = Arc::new(RecordingNotifier::new());
        let tasks = Arc::new(
            TaskManager::new(orchestrator.clone(), notifier.clone(), TEST_QUEUE)
                .with_scheduler(scheduler.clone()),
        );
        let worker = TaskWorker::new(
            storage.clone(),
            tasks.clone(),
            TEST_QUEUE,
            Duration::from_millis(10),
            self.runner_timeout * 2,
        );

        Ok(TestHarness {
            runner,
            channels,
            storage,
            registry,
            orchestrator,
            pipeline,
            scheduler,
            notifier,
            tasks,
            worker,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock adapters and temp storage.
pub struct TestHarness {
    pub runner: Arc<MockRunner>,
    channels: BTreeMap<String, Arc<MockChannel>>,
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<dyn StorageAdapter>,
    pub registry: Arc<ChannelRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub pipeline: Arc<InboundPipeline>,
    pub scheduler: Arc<CronScheduler>,
    pub notifier: Arc<RecordingNotifier>,
    pub tasks: Arc<TaskManager>,
    pub worker: TaskWorker,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with one plain channel and a non-streaming runner.
    pub async fn new() -> Result<Self, ThreadlineError> {
        Self::builder().build().await
    }

    /// The registered mock channel called `name`.
    pub fn channel(&self, name: &str) -> Result<Arc<MockChannel>, ThreadlineError> {
        self.channels
            .get(name)
            .cloned()
            .ok_or_else(|| ThreadlineError::AdapterNotFound {
                adapter_type: "channel".into(),
                name: name.to_string(),
            })
    }

    /// Delivers a message event on `adapter` and waits for the reply.
    ///
    /// Returns the conversation and the reply text.
    pub async fn send_event(
        &self,
        adapter: &str,
        user: &str,
        thread: &str,
        text: &str,
    ) -> Result<(ConversationId, String), ThreadlineError> {
        let request =
            RawRequest::new(json!({ "text": text, "user": user, "thread": thread }).to_string());
        match self.pipeline.handle_event(adapter, &request).await? {
            InboundOutcome::Dispatched {
                conversation_id,
                reply,
            } => {
                let text = reply
                    .await
                    .map_err(|e| ThreadlineError::Internal(format!("reply task failed: {e}")))??;
                Ok((conversation_id, text))
            }
            InboundOutcome::Challenge(challenge) => Err(ThreadlineError::InvalidState(format!(
                "unexpected verification challenge {challenge}"
            ))),
        }
    }

    /// Runs queued jobs until the queue is empty. Returns each job's result.
    pub async fn drain_queue(&self) -> Result<Vec<JobResult>, ThreadlineError> {
        let mut results = Vec::new();
        while let Some(result) = self.worker.run_once().await? {
            results.push(result);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_round_trip() {
        let harness = TestHarness::builder()
            .with_runner(MockRunner::new().with_responses(["Hello from harness!"]))
            .build()
            .await
            .unwrap();

        let (conversation_id, reply) = harness.send_event("mock", "u1", "T1", "Hi").await.unwrap();
        assert_eq!(reply, "Hello from harness!");

        let messages = harness
            .storage
            .get_messages(&conversation_id, None, None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(harness.channel("mock").unwrap().send_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_channel_is_reported() {
        let harness = TestHarness::new().await.unwrap();
        assert!(harness.channel("nope").is_err());
    }
}
