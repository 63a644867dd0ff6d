// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording task notifier.

use async_trait::async_trait;
use tokio::sync::Mutex;

use threadline_core::types::{Task, TaskStatus};
use threadline_core::{TaskId, TaskNotifier};

/// Lifecycle event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Complete,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedNotice {
    pub kind: NoticeKind,
    pub task_id: TaskId,
    /// Task status as seen by the notifier.
    pub status: TaskStatus,
    pub detail: String,
}

/// Captures every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<RecordedNotice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notices(&self) -> Vec<RecordedNotice> {
        self.notices.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.notices.lock().await.len()
    }

    pub async fn for_task(&self, task_id: &TaskId) -> Vec<RecordedNotice> {
        self.notices
            .lock()
            .await
            .iter()
            .filter(|n| &n.task_id == task_id)
            .cloned()
            .collect()
    }

    async fn push(&self, kind: NoticeKind, task: &Task, detail: &str) {
        self.notices.lock().await.push(RecordedNotice {
            kind,
            task_id: task.id.clone(),
            status: task.status,
            detail: detail.to_string(),
        });
    }
}

#[async_trait]
impl TaskNotifier for RecordingNotifier {
    async fn notify_complete(&self, task: &Task, result: &str) {
        self.push(NoticeKind::Complete, task, result).await;
    }

    async fn notify_failed(&self, task: &Task, error: &str) {
        self.push(NoticeKind::Failed, task, error).await;
    }

    async fn notify_blocked(&self, task: &Task, reason: &str) {
        self.push(NoticeKind::Blocked, task, reason).await;
    }
}
