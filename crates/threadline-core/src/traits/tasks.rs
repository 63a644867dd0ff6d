// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the task manager, the scheduler, and notification delivery.

use async_trait::async_trait;

use crate::error::ThreadlineError;
use crate::types::{Task, TaskId, TaskOutcome};

/// Runs tasks by id. Implemented by the task manager, driven by the
/// scheduler and the background worker.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executes a pending task. A no-op for inactive, terminal, or running tasks.
    async fn execute(&self, task_id: &TaskId) -> Result<TaskOutcome, ThreadlineError>;

    /// Executes a scheduled task for the cron occurrence at `occurrence`,
    /// re-arming it first when its previous run predates that occurrence.
    async fn execute_scheduled(
        &self,
        task_id: &TaskId,
        occurrence: &str,
    ) -> Result<TaskOutcome, ThreadlineError>;

    /// Records a run that was cut short by its caller, e.g. a job timeout
    /// that dropped the execution mid-flight.
    async fn abandon(&self, _task_id: &TaskId, _reason: &str) -> Result<(), ThreadlineError> {
        Ok(())
    }
}

/// Standing schedule registrations keyed by task id.
pub trait TaskSchedule: Send + Sync {
    /// Registers (or replaces) the schedule for a task and returns the next
    /// occurrence as a storage timestamp.
    fn schedule(&self, task_id: &TaskId, expression: &str) -> Result<String, ThreadlineError>;

    /// Removes the registration. Returns whether one existed.
    fn unschedule(&self, task_id: &TaskId) -> bool;
}

/// Delivers task lifecycle notifications.
///
/// Implementations attempt every configured channel independently and log
/// failures; they never fail the caller.
#[async_trait]
pub trait TaskNotifier: Send + Sync {
    async fn notify_complete(&self, task: &Task, result: &str);

    async fn notify_failed(&self, task: &Task, error: &str);

    async fn notify_blocked(&self, task: &Task, reason: &str);
}
