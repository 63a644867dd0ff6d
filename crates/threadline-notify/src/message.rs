// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification subjects and bodies for task lifecycle events.

use threadline_core::types::Task;

/// A rendered notification, independent of the channel carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub subject: String,
    pub body: String,
}

/// Link to the conversation behind a task, absolute when a public base URL is set.
pub fn conversation_link(task: &Task, public_base_url: Option<&str>) -> String {
    let path = format!("/conversations/{}", task.conversation_id);
    match public_base_url {
        Some(base) if !base.is_empty() => format!("{}{path}", base.trim_end_matches('/')),
        _ => path,
    }
}

fn render(
    task: &Task,
    headline: &str,
    status: &str,
    detail_label: &str,
    detail: &str,
    public_base_url: Option<&str>,
) -> Notice {
    let link = conversation_link(task, public_base_url);
    let body = format!(
        "Task ID: {id}\nType: {kind}\nStatus: {status}\nPrompt: {prompt}\n\n{detail_label}:\n{detail}\n\nPlease continue the conversation at: {link}\n",
        id = task.id,
        kind = task.task_type,
        prompt = task.prompt,
    );
    Notice {
        subject: format!("{headline}: {}", task.task_type),
        body,
    }
}

pub fn completed(task: &Task, result: &str, public_base_url: Option<&str>) -> Notice {
    render(task, "Task Completed", "Completed", "Result", result, public_base_url)
}

pub fn failed(task: &Task, error: &str, public_base_url: Option<&str>) -> Notice {
    render(task, "Task Failed", "Failed", "Error", error, public_base_url)
}

pub fn blocked(task: &Task, reason: &str, public_base_url: Option<&str>) -> Notice {
    render(
        task,
        "Task Blocked",
        "Blocked (Needs User Input)",
        "Reason",
        reason,
        public_base_url,
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use threadline_core::types::{
        ConversationId, NotificationConfig, TaskStatus, TaskType, now_timestamp,
    };
    use threadline_core::TaskId;

    use super::*;

    pub(crate) fn task(notifications: NotificationConfig) -> Task {
        Task {
            id: TaskId::from("task-1"),
            user_id: "u1".into(),
            conversation_id: ConversationId::from("conv-1"),
            task_type: TaskType::Scheduled,
            status: TaskStatus::Completed,
            prompt: "Summarize overnight alerts".into(),
            schedule: Some("0 9 * * *".into()),
            trigger_config: None,
            notifications,
            is_active: true,
            last_run_at: None,
            next_run_at: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    #[test]
    fn subjects_name_the_task_type() {
        let t = task(NotificationConfig::default());
        assert_eq!(completed(&t, "ok", None).subject, "Task Completed: scheduled");
        assert_eq!(failed(&t, "boom", None).subject, "Task Failed: scheduled");
        assert_eq!(blocked(&t, "?", None).subject, "Task Blocked: scheduled");
    }

    #[test]
    fn body_lists_details_and_link() {
        let t = task(NotificationConfig::default());
        let notice = blocked(&t, "Which region?", None);
        assert!(notice.body.contains("Task ID: task-1"));
        assert!(notice.body.contains("Status: Blocked (Needs User Input)"));
        assert!(notice.body.contains("Reason:\nWhich region?"));
        assert!(
            notice
                .body
                .contains("Please continue the conversation at: /conversations/conv-1")
        );
    }

    #[test]
    fn link_uses_public_base_url() {
        let t = task(NotificationConfig::default());
        assert_eq!(
            conversation_link(&t, Some("https://agent.example.com/")),
            "https://agent.example.com/conversations/conv-1"
        );
    }
}
