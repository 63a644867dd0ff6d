// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `threadline task list` command implementation.

use std::io::IsTerminal;

use threadline_config::ThreadlineConfig;
use threadline_core::types::{Task, TaskStatus};
use threadline_core::{StorageAdapter, ThreadlineError};
use threadline_storage::SqliteStorage;

fn status_cell(status: TaskStatus, use_color: bool) -> String {
    use colored::Colorize;

    let text = status.to_string();
    if !use_color {
        return text;
    }
    match status {
        TaskStatus::Completed => text.green().to_string(),
        TaskStatus::Failed => text.red().to_string(),
        TaskStatus::Blocked => text.yellow().to_string(),
        TaskStatus::Running => text.cyan().to_string(),
        TaskStatus::Pending => text,
    }
}

/// Renders one line per task.
fn render(tasks: &[Task], use_color: bool) -> String {
    if tasks.is_empty() {
        return "no tasks\n".to_string();
    }
    tasks
        .iter()
        .map(|t| {
            let schedule = t.schedule.as_deref().unwrap_or("-");
            let active = if t.is_active { "" } else { " (disabled)" };
            format!(
                "{}  {:<10} {:<9} {:<14} {}{}\n",
                t.id,
                t.task_type.to_string(),
                status_cell(t.status, use_color),
                schedule,
                t.prompt.lines().next().unwrap_or(""),
                active,
            )
        })
        .collect()
}

/// Run the `threadline task list` command.
pub async fn run_task_list(
    config: &ThreadlineConfig,
    user: &str,
    json: bool,
) -> Result<(), ThreadlineError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let tasks = storage.list_tasks_for_user(user).await?;
    storage.close().await?;

    if json {
        let out = serde_json::to_string_pretty(&tasks)
            .map_err(|e| ThreadlineError::Internal(format!("failed to serialize tasks: {e}")))?;
        println!("{out}");
    } else {
        print!("{}", render(&tasks, std::io::stdout().is_terminal()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use threadline_core::TaskId;
    use threadline_core::types::{NotificationConfig, TaskType};

    use super::*;

    fn task(status: TaskStatus) -> Task {
        Task {
            id: TaskId::from("t-1"),
            user_id: "u1".into(),
            conversation_id: "c-1".into(),
            task_type: TaskType::Scheduled,
            status,
            prompt: "daily digest\nwith details".into(),
            schedule: Some("0 9 * * *".into()),
            trigger_config: None,
            notifications: NotificationConfig::default(),
            is_active: false,
            last_run_at: None,
            next_run_at: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn renders_first_prompt_line() {
        let line = render(&[task(TaskStatus::Completed)], false);
        assert!(line.starts_with("t-1"));
        assert!(line.contains("scheduled"));
        assert!(line.contains("completed"));
        assert!(line.contains("0 9 * * *"));
        assert!(line.contains("daily digest (disabled)"));
        assert!(!line.contains("with details"));
    }

    #[test]
    fn renders_empty_list() {
        assert_eq!(render(&[], false), "no tasks\n");
    }
}
