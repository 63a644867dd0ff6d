// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process cron scheduler.
//!
//! Holds one registration per task id. A tick collects every registration
//! whose next occurrence has passed, advances it, and hands the occurrence to
//! the [`TaskExecutor`]. Duplicate suppression for a given occurrence lives in
//! the executor's re-arm guard, so a tick racing a manual run is harmless.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use croner::Cron;
use threadline_core::types::format_timestamp;
use threadline_core::{StorageAdapter, TaskExecutor, TaskId, TaskSchedule, ThreadlineError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::expression;

struct Registration {
    expression: String,
    cron: Cron,
    next: DateTime<Utc>,
}

/// A registration that came due on a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueJob {
    pub task_id: TaskId,
    /// The occurrence that fired, as a storage timestamp.
    pub occurrence: String,
    /// The following occurrence, as a storage timestamp.
    pub next_run_at: String,
}

/// Cron scheduler implementing [`TaskSchedule`].
pub struct CronScheduler {
    jobs: Mutex<HashMap<TaskId, Registration>>,
    tick_interval: Duration,
    runs: TaskTracker,
}

impl CronScheduler {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            tick_interval,
            runs: TaskTracker::new(),
        }
    }

    /// Tracks scheduled runs still in flight, for draining on shutdown.
    pub fn tracker(&self) -> &TaskTracker {
        &self.runs
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<TaskId, Registration>> {
        // A panic while holding the lock cannot leave a registration half-written.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `expression` for `task_id`, computing the first occurrence
    /// after `now`.
    pub fn schedule_at(
        &self,
        task_id: &TaskId,
        expression: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ThreadlineError> {
        let cron = expression::parse(expression)?;
        let next = expression::next_after(&cron, &now)?;
        let replaced = self
            .jobs()
            .insert(
                task_id.clone(),
                Registration {
                    expression: expression.to_string(),
                    cron,
                    next,
                },
            )
            .is_some();
        debug!(task_id = %task_id, expression, replaced, next = %next, "task scheduled");
        Ok(format_timestamp(&next))
    }

    /// The expression currently registered for a task.
    pub fn expression(&self, task_id: &TaskId) -> Option<String> {
        self.jobs().get(task_id).map(|r| r.expression.clone())
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collects registrations due at `now` and advances each past `now`.
    ///
    /// Missed occurrences collapse into a single firing for the most recent
    /// one that was due.
    pub fn due_at(&self, now: DateTime<Utc>) -> Vec<DueJob> {
        let mut due = Vec::new();
        let mut jobs = self.jobs();
        for (task_id, reg) in jobs.iter_mut() {
            if reg.next > now {
                continue;
            }
            let mut occurrence = reg.next;
            let next = loop {
                match expression::next_after(&reg.cron, &occurrence) {
                    Ok(n) if n <= now => occurrence = n,
                    Ok(n) => break Some(n),
                    Err(e) => {
                        warn!(task_id = %task_id, error = %e, "schedule exhausted");
                        break None;
                    }
                }
            };
            let Some(next) = next else { continue };
            reg.next = next;
            due.push(DueJob {
                task_id: task_id.clone(),
                occurrence: format_timestamp(&occurrence),
                next_run_at: format_timestamp(&next),
            });
        }
        due
    }

    /// Registers every active scheduled task found in storage and stamps its
    /// next run. Tasks with unparsable expressions are logged and skipped.
    pub async fn load_scheduled_tasks(
        &self,
        storage: &dyn StorageAdapter,
    ) -> Result<usize, ThreadlineError> {
        let tasks = storage.list_scheduled_tasks().await?;
        let now = Utc::now();
        let mut loaded = 0;
        for task in tasks {
            let Some(expr) = task.schedule.as_deref() else {
                continue;
            };
            match self.schedule_at(&task.id, expr, now) {
                Ok(next) => {
                    storage.set_task_next_run(&task.id, Some(&next)).await?;
                    loaded += 1;
                }
                Err(e) => warn!(task_id = %task.id, error = %e, "skipping unschedulable task"),
            }
        }
        info!(count = loaded, "scheduled tasks loaded");
        Ok(loaded)
    }

    /// Fires due jobs until `cancel` is triggered.
    ///
    /// Each firing runs on its own task in [`Self::tracker`], so a long
    /// execution never delays the next tick. A run that errors is abandoned
    /// so the task does not stay `running`.
    pub async fn run(
        self: Arc<Self>,
        executor: Arc<dyn TaskExecutor>,
        storage: Arc<dyn StorageAdapter>,
        cancel: CancellationToken,
    ) {
        info!(interval_secs = self.tick_interval.as_secs(), "scheduler started");
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            for job in self.due_at(Utc::now()) {
                if let Err(e) = storage
                    .set_task_next_run(&job.task_id, Some(&job.next_run_at))
                    .await
                {
                    warn!(task_id = %job.task_id, error = %e, "failed to stamp next run");
                }
                let executor = executor.clone();
                self.runs.spawn(async move {
                    match executor.execute_scheduled(&job.task_id, &job.occurrence).await {
                        Ok(outcome) => {
                            info!(task_id = %job.task_id, occurrence = %job.occurrence, outcome = %outcome, "scheduled run finished")
                        }
                        Err(e) => {
                            error!(task_id = %job.task_id, occurrence = %job.occurrence, error = %e, "scheduled run failed");
                            if let Err(e) = executor.abandon(&job.task_id, &e.to_string()).await {
                                error!(task_id = %job.task_id, error = %e, "failed to record abandoned run");
                            }
                        }
                    }
                });
            }
        }
        info!("scheduler stopped");
    }
}

impl TaskSchedule for CronScheduler {
    fn schedule(&self, task_id: &TaskId, expression: &str) -> Result<String, ThreadlineError> {
        self.schedule_at(task_id, expression, Utc::now())
    }

    fn unschedule(&self, task_id: &TaskId) -> bool {
        let removed = self.jobs().remove(task_id).is_some();
        if removed {
            debug!(task_id = %task_id, "task unscheduled");
        }
        removed
    }
}
