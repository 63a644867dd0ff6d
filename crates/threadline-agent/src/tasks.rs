// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task lifecycle manager.
//!
//! A task moves `pending -> running -> completed | failed`, or parks in
//! `blocked` when the runner needs input from the user. The only way into
//! `running` is the storage claim, a conditional update that exactly one
//! concurrent caller wins. Every attempt that reaches `running` leaves it
//! again with exactly one notification.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use threadline_core::types::{
    Conversation, ConversationStatus, NewTask, Task, TaskOutcome, TaskStatus, TaskType,
    TaskUpdate, now_timestamp,
};
use threadline_core::{
    StorageAdapter, TaskExecutor, TaskId, TaskNotifier, TaskSchedule, ThreadlineError,
};
use tracing::{debug, error, info, warn};

use crate::orchestrator::Orchestrator;
use crate::worker::ExecuteJob;

pub struct TaskManager {
    storage: Arc<dyn StorageAdapter>,
    orchestrator: Arc<Orchestrator>,
    notifier: Arc<dyn TaskNotifier>,
    scheduler: Option<Arc<dyn TaskSchedule>>,
    queue_name: String,
}

impl TaskManager {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        notifier: Arc<dyn TaskNotifier>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            storage: orchestrator.storage().clone(),
            orchestrator,
            notifier,
            scheduler: None,
            queue_name: queue_name.into(),
        }
    }

    /// Registers scheduled tasks with `scheduler` on create, update and enable.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskSchedule>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Creates a task and its conversation.
    ///
    /// Delegation tasks are queued for execution immediately. Scheduled tasks
    /// are registered with the scheduler; an expression it rejects rolls the
    /// creation back.
    pub async fn create_task(&self, new: NewTask) -> Result<Task, ThreadlineError> {
        if new.prompt.trim().is_empty() {
            return Err(ThreadlineError::Validation("task prompt is empty".into()));
        }
        if new.task_type == TaskType::Scheduled && new.schedule.is_none() {
            return Err(ThreadlineError::Validation(
                "scheduled tasks require a schedule".into(),
            ));
        }

        let conversation = Conversation::new(&new.user_id, new.task_type.to_string());
        self.storage.create_conversation(&conversation).await?;

        let now = now_timestamp();
        let mut task = Task {
            id: TaskId::new(),
            user_id: new.user_id,
            conversation_id: conversation.id.clone(),
            task_type: new.task_type,
            status: TaskStatus::Pending,
            prompt: new.prompt,
            schedule: new.schedule,
            trigger_config: new.trigger_config,
            notifications: new.notifications,
            is_active: true,
            last_run_at: None,
            next_run_at: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.storage.create_task(&task).await?;
        self.storage
            .link_conversation_task(&conversation.id, &task.id)
            .await?;

        if let Err(e) = self.register(&mut task).await {
            warn!(task_id = %task.id, error = %e, "rolling back task with invalid schedule");
            self.storage.delete_task(&task.id).await?;
            self.storage.delete_conversation(&conversation.id).await?;
            return Err(e);
        }

        info!(
            task_id = %task.id,
            task_type = %task.task_type,
            conversation_id = %task.conversation_id,
            "task created"
        );
        if task.task_type == TaskType::Delegation {
            self.enqueue(ExecuteJob::new(task.id.clone())).await?;
        }
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &TaskId) -> Result<Task, ThreadlineError> {
        self.storage
            .get_task(task_id)
            .await?
            .ok_or_else(|| ThreadlineError::not_found("task", task_id.as_str()))
    }

    pub async fn list_tasks(&self, user_id: &str) -> Result<Vec<Task>, ThreadlineError> {
        self.storage.list_tasks_for_user(user_id).await
    }

    /// Applies configuration edits. Refused while the task is running.
    pub async fn update_task(
        &self,
        task_id: &TaskId,
        update: &TaskUpdate,
    ) -> Result<Task, ThreadlineError> {
        let current = self.get_task(task_id).await?;
        ensure_idle(&current, "update")?;
        if update.prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(ThreadlineError::Validation("task prompt is empty".into()));
        }

        let mut task = current.clone();
        update.apply(&mut task);
        task.updated_at = now_timestamp();

        // Validate the new schedule before anything is written.
        let next_run = self.reschedule(&task)?;
        if !self.storage.update_task_config(&task).await? {
            self.restore_registration(&current);
            return Err(ThreadlineError::InvalidState(format!(
                "task {task_id} started running during the update"
            )));
        }
        self.storage
            .set_task_next_run(task_id, next_run.as_deref())
            .await?;
        task.next_run_at = next_run;
        info!(task_id = %task_id, "task updated");
        Ok(task)
    }

    /// Deactivates a task and removes its schedule.
    pub async fn disable_task(&self, task_id: &TaskId) -> Result<Task, ThreadlineError> {
        let mut task = self.get_task(task_id).await?;
        ensure_idle(&task, "disable")?;
        self.storage.set_task_active(task_id, false).await?;
        if let Some(scheduler) = &self.scheduler {
            scheduler.unschedule(task_id);
        }
        self.storage.set_task_next_run(task_id, None).await?;
        task.is_active = false;
        task.next_run_at = None;
        info!(task_id = %task_id, "task disabled");
        Ok(task)
    }

    /// Reactivates a task and restores its schedule.
    pub async fn enable_task(&self, task_id: &TaskId) -> Result<Task, ThreadlineError> {
        let mut task = self.get_task(task_id).await?;
        ensure_idle(&task, "enable")?;
        task.is_active = true;
        let next_run = self.reschedule(&task)?;
        self.storage.set_task_active(task_id, true).await?;
        self.storage
            .set_task_next_run(task_id, next_run.as_deref())
            .await?;
        task.next_run_at = next_run;
        info!(task_id = %task_id, "task enabled");
        Ok(task)
    }

    /// Deletes a task. Its conversation and transcript are kept.
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<(), ThreadlineError> {
        let task = self.get_task(task_id).await?;
        ensure_idle(&task, "delete")?;
        if let Some(scheduler) = &self.scheduler {
            scheduler.unschedule(task_id);
        }
        self.storage.delete_task(task_id).await?;
        info!(task_id = %task_id, "task deleted");
        Ok(())
    }

    /// Re-arms a finished task and queues a run. Returns the job id.
    pub async fn execute_now(&self, task_id: &TaskId) -> Result<i64, ThreadlineError> {
        let task = self.get_task(task_id).await?;
        ensure_idle(&task, "execute")?;
        self.storage.rearm_task(task_id, None).await?;
        self.enqueue(ExecuteJob::new(task.id)).await
    }

    /// Fires a triggered task. The payload travels with the job and is
    /// logged; the task runs its stored prompt.
    pub async fn trigger(
        &self,
        task_id: &TaskId,
        payload: Option<Value>,
    ) -> Result<i64, ThreadlineError> {
        let task = self.get_task(task_id).await?;
        if task.task_type != TaskType::Triggered {
            return Err(ThreadlineError::InvalidState(format!(
                "task {task_id} is a {} task, not triggered",
                task.task_type
            )));
        }
        if !task.is_active {
            return Err(ThreadlineError::InvalidState(format!(
                "task {task_id} is disabled"
            )));
        }
        self.storage.rearm_task(task_id, None).await?;
        let job_id = self
            .enqueue(ExecuteJob {
                task_id: task.id,
                trigger_payload: payload,
            })
            .await?;
        info!(task_id = %task_id, job_id, "task triggered");
        Ok(job_id)
    }

    /// Returns a blocked task to `pending`.
    pub async fn resume_blocked(&self, task_id: &TaskId) -> Result<bool, ThreadlineError> {
        self.storage.resume_blocked_task(task_id).await
    }

    async fn enqueue(&self, job: ExecuteJob) -> Result<i64, ThreadlineError> {
        let job_id = self
            .storage
            .enqueue(&self.queue_name, &job.to_payload()?)
            .await?;
        debug!(task_id = %job.task_id, job_id, "task queued");
        Ok(job_id)
    }

    /// Registers a freshly created task and stamps its next run.
    async fn register(&self, task: &mut Task) -> Result<(), ThreadlineError> {
        let next_run = self.reschedule(task)?;
        if next_run.is_some() {
            self.storage
                .set_task_next_run(&task.id, next_run.as_deref())
                .await?;
        }
        task.next_run_at = next_run;
        Ok(())
    }

    /// Brings the scheduler registration in line with `task` and returns the
    /// next occurrence, if any.
    /// Expressions are checked even when no scheduler is attached.
    fn reschedule(&self, task: &Task) -> Result<Option<String>, ThreadlineError> {
        match (&task.schedule, task.task_type, task.is_active) {
            (Some(expression), TaskType::Scheduled, true) => {
                threadline_cron::expression::parse(expression)?;
                match &self.scheduler {
                    Some(scheduler) => scheduler.schedule(&task.id, expression).map(Some),
                    None => Ok(None),
                }
            }
            _ => {
                if let Some(scheduler) = &self.scheduler {
                    scheduler.unschedule(&task.id);
                }
                Ok(None)
            }
        }
    }

    fn restore_registration(&self, task: &Task) {
        if let Err(e) = self.reschedule(task) {
            warn!(task_id = %task.id, error = %e, "failed to restore schedule");
        }
    }

    /// Re-reads a task after a transition so notifications see the stored state.
    async fn reload(&self, task: Task) -> Task {
        match self.storage.get_task(&task.id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => task,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "failed to reload task");
                task
            }
        }
    }

    async fn mark_conversation(&self, task: &Task, status: ConversationStatus) {
        if let Err(e) = self
            .storage
            .update_conversation_status(&task.conversation_id, status)
            .await
        {
            warn!(conversation_id = %task.conversation_id, error = %e, "failed to update conversation status");
        }
    }
}

fn ensure_idle(task: &Task, action: &str) -> Result<(), ThreadlineError> {
    if task.status == TaskStatus::Running {
        return Err(ThreadlineError::InvalidState(format!(
            "cannot {action} task {} while it is running",
            task.id
        )));
    }
    Ok(())
}

#[async_trait]
impl TaskExecutor for TaskManager {
    async fn execute(&self, task_id: &TaskId) -> Result<TaskOutcome, ThreadlineError> {
        let Some(task) = self.storage.get_task(task_id).await? else {
            debug!(task_id = %task_id, "skipping missing task");
            return Ok(TaskOutcome::Skipped);
        };
        if !task.is_active || task.status != TaskStatus::Pending {
            debug!(task_id = %task_id, status = %task.status, active = task.is_active, "skipping task");
            return Ok(TaskOutcome::Skipped);
        }
        if !self.storage.claim_task(task_id).await? {
            debug!(task_id = %task_id, "claim lost to another runner");
            return Ok(TaskOutcome::Skipped);
        }
        info!(task_id = %task_id, task_type = %task.task_type, "task started");

        match self
            .orchestrator
            .run_background(&task.conversation_id, &task.prompt)
            .await
        {
            Ok(result) if result.is_blocked() => {
                self.storage
                    .finish_task(task_id, TaskStatus::Blocked, Some(&result.content))
                    .await?;
                let task = self.reload(task).await;
                self.mark_conversation(&task, ConversationStatus::Waiting).await;
                info!(task_id = %task_id, "task blocked on user input");
                self.notifier.notify_blocked(&task, &result.content).await;
                Ok(TaskOutcome::Blocked)
            }
            Ok(result) => {
                self.storage
                    .finish_task(task_id, TaskStatus::Completed, None)
                    .await?;
                let task = self.reload(task).await;
                self.mark_conversation(&task, ConversationStatus::Completed).await;
                info!(task_id = %task_id, "task completed");
                self.notifier.notify_complete(&task, &result.content).await;
                Ok(TaskOutcome::Completed)
            }
            Err(e) => {
                if e.is_execution_failure() {
                    warn!(task_id = %task_id, error = %e, "task failed");
                } else {
                    error!(task_id = %task_id, error = %e, "task failed unexpectedly");
                }
                let message = e.to_string();
                self.storage
                    .finish_task(task_id, TaskStatus::Failed, Some(&message))
                    .await?;
                let task = self.reload(task).await;
                self.mark_conversation(&task, ConversationStatus::Failed).await;
                self.notifier.notify_failed(&task, &message).await;
                Ok(TaskOutcome::Failed)
            }
        }
    }

    async fn execute_scheduled(
        &self,
        task_id: &TaskId,
        occurrence: &str,
    ) -> Result<TaskOutcome, ThreadlineError> {
        if self.storage.rearm_task(task_id, Some(occurrence)).await? {
            debug!(task_id = %task_id, occurrence, "task re-armed");
        }
        self.execute(task_id).await
    }

    async fn abandon(&self, task_id: &TaskId, reason: &str) -> Result<(), ThreadlineError> {
        let Some(task) = self.storage.get_task(task_id).await? else {
            return Ok(());
        };
        if task.status != TaskStatus::Running {
            return Ok(());
        }
        self.storage
            .finish_task(task_id, TaskStatus::Failed, Some(reason))
            .await?;
        let task = self.reload(task).await;
        self.mark_conversation(&task, ConversationStatus::Failed).await;
        warn!(task_id = %task_id, reason, "task abandoned");
        self.notifier.notify_failed(&task, reason).await;
        Ok(())
    }
}
