// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task operations.
//!
//! Lifecycle transitions are single conditional UPDATEs, so concurrent
//! callers race on the row and exactly one wins.

use rusqlite::{Row, params};
use threadline_core::ThreadlineError;
use threadline_core::types::{ConversationId, TaskId};

use crate::database::Database;
use crate::models::{
    Task, TaskStatus, parse_enum, parse_json, parse_json_opt, to_json, to_json_opt,
};

const COLUMNS: &str = "id, user_id, conversation_id, task_type, status, prompt, schedule,
    trigger_config, notifications, is_active, last_run_at, next_run_at, started_at,
    completed_at, error_message, created_at, updated_at";

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: TaskId(row.get(0)?),
        user_id: row.get(1)?,
        conversation_id: ConversationId(row.get(2)?),
        task_type: parse_enum(3, row.get(3)?)?,
        status: parse_enum(4, row.get(4)?)?,
        prompt: row.get(5)?,
        schedule: row.get(6)?,
        trigger_config: parse_json_opt(7, row.get(7)?)?,
        notifications: parse_json(8, row.get(8)?)?,
        is_active: row.get(9)?,
        last_run_at: row.get(10)?,
        next_run_at: row.get(11)?,
        started_at: row.get(12)?,
        completed_at: row.get(13)?,
        error_message: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

async fn query_one(
    db: &Database,
    filter: &'static str,
    key: String,
) -> Result<Option<Task>, ThreadlineError> {
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM tasks WHERE {filter}");
            match conn.query_row(&sql, params![key], from_row) {
                Ok(t) => Ok(Some(t)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

async fn execute(
    db: &Database,
    sql: String,
    args: Vec<Option<String>>,
) -> Result<usize, ThreadlineError> {
    db.connection()
        .call(move |conn| conn.execute(&sql, rusqlite::params_from_iter(args)))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert a new task.
pub async fn create_task(db: &Database, task: &Task) -> Result<(), ThreadlineError> {
    let t = task.clone();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "INSERT INTO tasks ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            );
            conn.execute(
                &sql,
                params![
                    t.id.as_str(),
                    t.user_id,
                    t.conversation_id.as_str(),
                    t.task_type.to_string(),
                    t.status.to_string(),
                    t.prompt,
                    t.schedule,
                    to_json_opt(t.trigger_config.as_ref())?,
                    to_json(&t.notifications)?,
                    t.is_active,
                    t.last_run_at,
                    t.next_run_at,
                    t.started_at,
                    t.completed_at,
                    t.error_message,
                    t.created_at,
                    t.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_task(db: &Database, id: &TaskId) -> Result<Option<Task>, ThreadlineError> {
    query_one(db, "id = ?1", id.as_str().to_string()).await
}

pub async fn get_task_by_conversation(
    db: &Database,
    conversation_id: &ConversationId,
) -> Result<Option<Task>, ThreadlineError> {
    query_one(db, "conversation_id = ?1", conversation_id.as_str().to_string()).await
}

/// A user's tasks, newest first.
pub async fn list_tasks_for_user(db: &Database, user_id: &str) -> Result<Vec<Task>, ThreadlineError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Active tasks carrying a schedule expression.
pub async fn list_scheduled_tasks(db: &Database) -> Result<Vec<Task>, ThreadlineError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {COLUMNS} FROM tasks
                 WHERE is_active = 1 AND schedule IS NOT NULL AND schedule != ''"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Writes the editable fields. Refused (returns `false`) while running.
pub async fn update_task_config(db: &Database, task: &Task) -> Result<bool, ThreadlineError> {
    let t = task.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE tasks SET prompt = ?1, schedule = ?2, trigger_config = ?3,
                     notifications = ?4, is_active = ?5, updated_at = {NOW}
                     WHERE id = ?6 AND status != 'running'"
                ),
                params![
                    t.prompt,
                    t.schedule,
                    to_json_opt(t.trigger_config.as_ref())?,
                    to_json(&t.notifications)?,
                    t.is_active,
                    t.id.as_str(),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn set_task_active(db: &Database, id: &TaskId, active: bool) -> Result<(), ThreadlineError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!("UPDATE tasks SET is_active = ?1, updated_at = {NOW} WHERE id = ?2"),
                params![active, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn delete_task(db: &Database, id: &TaskId) -> Result<(), ThreadlineError> {
    execute(
        db,
        "DELETE FROM tasks WHERE id = ?1".to_string(),
        vec![Some(id.as_str().to_string())],
    )
    .await
    .map(|_| ())
}

/// `pending -> running` for an active task. Only one concurrent caller wins.
pub async fn claim_task(db: &Database, id: &TaskId) -> Result<bool, ThreadlineError> {
    let sql = format!(
        "UPDATE tasks SET status = 'running', started_at = {NOW}, last_run_at = {NOW},
         completed_at = NULL, error_message = NULL, updated_at = {NOW}
         WHERE id = ?1 AND status = 'pending' AND is_active = 1"
    );
    let changed = execute(db, sql, vec![Some(id.as_str().to_string())]).await?;
    Ok(changed > 0)
}

/// Records the outcome of a running task. Terminal outcomes stamp
/// `completed_at`; `blocked` leaves it unset.
pub async fn finish_task(
    db: &Database,
    id: &TaskId,
    status: TaskStatus,
    error_message: Option<&str>,
) -> Result<(), ThreadlineError> {
    if !matches!(
        status,
        TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Blocked
    ) {
        return Err(ThreadlineError::InvalidState(format!(
            "cannot finish task with status {status}"
        )));
    }
    let completed_at = if status.is_terminal() { NOW } else { "NULL" };
    let sql = format!(
        "UPDATE tasks SET status = ?1, error_message = ?2, completed_at = {completed_at},
         updated_at = {NOW}
         WHERE id = ?3 AND status = 'running'"
    );
    execute(
        db,
        sql,
        vec![
            Some(status.to_string()),
            error_message.map(str::to_string),
            Some(id.as_str().to_string()),
        ],
    )
    .await
    .map(|_| ())
}

/// Returns a completed or failed task to `pending`.
///
/// With `occurrence`, the task is re-armed only if its last run started
/// before that instant, so repeated firings of one occurrence re-arm once.
pub async fn rearm_task(
    db: &Database,
    id: &TaskId,
    occurrence: Option<&str>,
) -> Result<bool, ThreadlineError> {
    let mut sql = format!(
        "UPDATE tasks SET status = 'pending', updated_at = {NOW}
         WHERE id = ?1 AND status IN ('completed', 'failed')"
    );
    let mut args = vec![Some(id.as_str().to_string())];
    if let Some(occurrence) = occurrence {
        sql.push_str(" AND (last_run_at IS NULL OR last_run_at < ?2)");
        args.push(Some(occurrence.to_string()));
    }
    Ok(execute(db, sql, args).await? > 0)
}

/// `blocked -> pending`.
pub async fn resume_blocked_task(db: &Database, id: &TaskId) -> Result<bool, ThreadlineError> {
    let sql = format!(
        "UPDATE tasks SET status = 'pending', updated_at = {NOW}
         WHERE id = ?1 AND status = 'blocked'"
    );
    Ok(execute(db, sql, vec![Some(id.as_str().to_string())]).await? > 0)
}

/// Fails every task left `running` by a previous process. Returns the count.
pub async fn fail_interrupted_tasks(db: &Database, reason: &str) -> Result<usize, ThreadlineError> {
    let sql = format!(
        "UPDATE tasks SET status = 'failed', error_message = ?1, completed_at = {NOW},
         updated_at = {NOW}
         WHERE status = 'running'"
    );
    execute(db, sql, vec![Some(reason.to_string())]).await
}

pub async fn set_task_next_run(
    db: &Database,
    id: &TaskId,
    next_run_at: Option<&str>,
) -> Result<(), ThreadlineError> {
    execute(
        db,
        "UPDATE tasks SET next_run_at = ?1 WHERE id = ?2".to_string(),
        vec![next_run_at.map(str::to_string), Some(id.as_str().to_string())],
    )
    .await
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use threadline_core::types::{
        NotificationChannel, NotificationConfig, TaskType, now_timestamp,
    };

    use super::*;
    use crate::queries::test_support::{seed_conversation, setup_db};

    async fn seed_task(db: &Database, task_type: TaskType) -> Task {
        let conversation = seed_conversation(db, "alice").await;
        let now = now_timestamp();
        let task = Task {
            id: TaskId::new(),
            user_id: "alice".into(),
            conversation_id: conversation.id,
            task_type,
            status: TaskStatus::Pending,
            prompt: "summarize the inbox".into(),
            schedule: (task_type == TaskType::Scheduled).then(|| "0 9 * * *".to_string()),
            trigger_config: None,
            notifications: NotificationConfig {
                channels: vec![NotificationChannel::Email {
                    address: "alice@example.com".into(),
                }],
            },
            is_active: true,
            last_run_at: None,
            next_run_at: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        };
        create_task(db, &task).await.unwrap();
        task
    }

    #[tokio::test]
    async fn create_get_and_lookup_by_conversation() {
        let (db, _dir) = setup_db().await;
        let task = seed_task(&db, TaskType::Delegation).await;

        let loaded = get_task(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(loaded, task);
        let by_conv = get_task_by_conversation(&db, &task.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_conv.id, task.id);
        assert_eq!(list_tasks_for_user(&db, "alice").await.unwrap().len(), 1);
        assert!(list_tasks_for_user(&db, "bob").await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn only_one_concurrent_claim_wins() {
        let (db, _dir) = setup_db().await;
        let task = seed_task(&db, TaskType::Delegation).await;
        let db = Arc::new(db);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            let id = task.id.clone();
            handles.push(tokio::spawn(async move { claim_task(&db, &id).await.unwrap() }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let loaded = get_task(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Running);
        assert!(loaded.started_at.is_some());
        assert!(loaded.last_run_at.is_some());
    }

    #[tokio::test]
    async fn finish_stamps_completion_except_when_blocked() {
        let (db, _dir) = setup_db().await;
        let task = seed_task(&db, TaskType::Delegation).await;

        assert!(claim_task(&db, &task.id).await.unwrap());
        finish_task(&db, &task.id, TaskStatus::Blocked, None).await.unwrap();
        let blocked = get_task(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(blocked.status, TaskStatus::Blocked);
        assert!(blocked.completed_at.is_none());

        assert!(resume_blocked_task(&db, &task.id).await.unwrap());
        assert!(claim_task(&db, &task.id).await.unwrap());
        finish_task(&db, &task.id, TaskStatus::Failed, Some("runner exploded"))
            .await
            .unwrap();
        let failed = get_task(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.completed_at.is_some());
        assert_eq!(failed.error_message.as_deref(), Some("runner exploded"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn terminal_tasks_are_not_claimable_until_rearmed() {
        let (db, _dir) = setup_db().await;
        let task = seed_task(&db, TaskType::Scheduled).await;

        assert!(claim_task(&db, &task.id).await.unwrap());
        finish_task(&db, &task.id, TaskStatus::Completed, None).await.unwrap();
        assert!(!claim_task(&db, &task.id).await.unwrap());

        let ran_at = get_task(&db, &task.id).await.unwrap().unwrap().last_run_at.unwrap();
        // The occurrence that already ran does not re-arm the task.
        assert!(!rearm_task(&db, &task.id, Some(&ran_at)).await.unwrap());
        assert!(rearm_task(&db, &task.id, Some("9999-01-01T00:00:00.000Z")).await.unwrap());
        assert!(claim_task(&db, &task.id).await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn config_update_refused_while_running() {
        let (db, _dir) = setup_db().await;
        let mut task = seed_task(&db, TaskType::Delegation).await;
        assert!(claim_task(&db, &task.id).await.unwrap());

        task.prompt = "changed".into();
        assert!(!update_task_config(&db, &task).await.unwrap());

        finish_task(&db, &task.id, TaskStatus::Completed, None).await.unwrap();
        assert!(update_task_config(&db, &task).await.unwrap());
        let loaded = get_task(&db, &task.id).await.unwrap().unwrap();
        assert_eq!(loaded.prompt, "changed");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn inactive_tasks_drop_out_of_schedule_listing() {
        let (db, _dir) = setup_db().await;
        let scheduled = seed_task(&db, TaskType::Scheduled).await;
        seed_task(&db, TaskType::Delegation).await;

        assert_eq!(list_scheduled_tasks(&db).await.unwrap().len(), 1);
        set_task_active(&db, &scheduled.id, false).await.unwrap();
        assert!(list_scheduled_tasks(&db).await.unwrap().is_empty());
        assert!(!claim_task(&db, &scheduled.id).await.unwrap());

        set_task_next_run(&db, &scheduled.id, Some("2030-01-01T09:00:00.000Z"))
            .await
            .unwrap();
        let loaded = get_task(&db, &scheduled.id).await.unwrap().unwrap();
        assert_eq!(loaded.next_run_at.as_deref(), Some("2030-01-01T09:00:00.000Z"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn interrupted_tasks_are_failed() {
        let (db, _dir) = setup_db().await;
        let running = seed_task(&db, TaskType::Delegation).await;
        let idle = seed_task(&db, TaskType::Delegation).await;
        assert!(claim_task(&db, &running.id).await.unwrap());

        assert_eq!(fail_interrupted_tasks(&db, "interrupted").await.unwrap(), 1);
        let failed = get_task(&db, &running.id).await.unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("interrupted"));
        let untouched = get_task(&db, &idle.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, TaskStatus::Pending);
        db.close().await.unwrap();
    }
}
