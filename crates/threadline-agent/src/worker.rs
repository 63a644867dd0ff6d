// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background task worker.
//!
//! Polls the job queue and runs each `execute` job under a timeout. Jobs are
//! at-least-once: a job that errors is failed back to the queue and retried
//! until its attempts run out. The executor's claim makes a redelivered job
//! harmless once the task has left `pending`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use threadline_config::model::WorkerConfig;
use threadline_core::types::QueueEntry;
use threadline_core::{StorageAdapter, TaskExecutor, TaskId, ThreadlineError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Payload of a queued task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteJob {
    pub task_id: TaskId,
    /// Body posted to the trigger endpoint. Recorded for operators only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_payload: Option<Value>,
}

impl ExecuteJob {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            trigger_payload: None,
        }
    }

    pub fn to_payload(&self) -> Result<String, ThreadlineError> {
        serde_json::to_string(self)
            .map_err(|e| ThreadlineError::Internal(format!("failed to encode job: {e}")))
    }
}

/// What happened to one dequeued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Acked,
    Failed,
    TimedOut,
    Malformed,
}

/// Drains the task queue.
pub struct TaskWorker {
    storage: Arc<dyn StorageAdapter>,
    executor: Arc<dyn TaskExecutor>,
    queue_name: String,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl TaskWorker {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        executor: Arc<dyn TaskExecutor>,
        queue_name: impl Into<String>,
        poll_interval: Duration,
        job_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            executor,
            queue_name: queue_name.into(),
            poll_interval,
            job_timeout,
        }
    }

    pub fn from_config(
        config: &WorkerConfig,
        storage: Arc<dyn StorageAdapter>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self::new(
            storage,
            executor,
            config.queue_name.clone(),
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.job_timeout_secs),
        )
    }

    /// Processes at most one job. Returns `None` when the queue is empty.
    pub async fn run_once(&self) -> Result<Option<JobResult>, ThreadlineError> {
        let Some(entry) = self.storage.dequeue(&self.queue_name).await? else {
            return Ok(None);
        };
        Ok(Some(self.process(entry).await?))
    }

    async fn process(&self, entry: QueueEntry) -> Result<JobResult, ThreadlineError> {
        let job: ExecuteJob = match serde_json::from_str(&entry.payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = entry.id, error = %e, "discarding malformed job");
                self.storage.fail(entry.id).await?;
                return Ok(JobResult::Malformed);
            }
        };
        if let Some(payload) = &job.trigger_payload {
            info!(job_id = entry.id, task_id = %job.task_id, payload = %payload, "trigger payload received");
        }

        debug!(job_id = entry.id, task_id = %job.task_id, attempt = entry.attempts, "job started");
        match tokio::time::timeout(self.job_timeout, self.executor.execute(&job.task_id)).await {
            Ok(Ok(outcome)) => {
                self.storage.ack(entry.id).await?;
                info!(job_id = entry.id, task_id = %job.task_id, outcome = %outcome, "job finished");
                Ok(JobResult::Acked)
            }
            Ok(Err(e)) => {
                warn!(job_id = entry.id, task_id = %job.task_id, error = %e, "job failed");
                self.storage.fail(entry.id).await?;
                self.abandon(&job.task_id, &e.to_string()).await;
                Ok(JobResult::Failed)
            }
            Err(_) => {
                let reason = format!("job timed out after {}s", self.job_timeout.as_secs());
                warn!(job_id = entry.id, task_id = %job.task_id, "{reason}");
                self.storage.fail(entry.id).await?;
                self.abandon(&job.task_id, &reason).await;
                Ok(JobResult::TimedOut)
            }
        }
    }

    /// Releases a task the executor may have left `running`.
    async fn abandon(&self, task_id: &TaskId, reason: &str) {
        if let Err(e) = self.executor.abandon(task_id, reason).await {
            error!(task_id = %task_id, error = %e, "failed to record abandoned run");
        }
    }

    /// Polls until `cancel` fires. An in-flight job finishes first.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(queue = %self.queue_name, "task worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let idle = match self.run_once().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    error!(queue = %self.queue_name, error = %e, "queue poll failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        info!(queue = %self.queue_name, "task worker stopped");
    }
}
