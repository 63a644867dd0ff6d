// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup loading of scheduled tasks from storage.

use threadline_core::types::{
    Conversation, NotificationConfig, Task, TaskStatus, TaskType, now_timestamp,
};
use threadline_core::{StorageAdapter, TaskId};
use threadline_cron::CronScheduler;
use threadline_storage::SqliteStorage;

async fn storage() -> (tempfile::TempDir, SqliteStorage) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cron.db");
    let storage = SqliteStorage::open(path.to_str().unwrap()).await.unwrap();
    (dir, storage)
}

async fn insert_task(storage: &SqliteStorage, schedule: Option<&str>, active: bool) -> TaskId {
    let conversation = Conversation::new("u1", "scheduled");
    storage.create_conversation(&conversation).await.unwrap();
    let now = now_timestamp();
    let task = Task {
        id: TaskId::new(),
        user_id: "u1".into(),
        conversation_id: conversation.id.clone(),
        task_type: TaskType::Scheduled,
        status: TaskStatus::Pending,
        prompt: "daily digest".into(),
        schedule: schedule.map(str::to_string),
        trigger_config: None,
        notifications: NotificationConfig::default(),
        is_active: active,
        last_run_at: None,
        next_run_at: None,
        started_at: None,
        completed_at: None,
        error_message: None,
        created_at: now.clone(),
        updated_at: now,
    };
    storage.create_task(&task).await.unwrap();
    task.id
}

#[tokio::test]
async fn loads_active_schedules_and_stamps_next_run() {
    let (_dir, storage) = storage().await;
    let daily = insert_task(&storage, Some("0 9 * * *"), true).await;
    let paused = insert_task(&storage, Some("0 9 * * *"), false).await;
    let broken = insert_task(&storage, Some("not a cron"), true).await;

    let scheduler = CronScheduler::new(std::time::Duration::from_secs(15));
    let loaded = scheduler.load_scheduled_tasks(&storage).await.unwrap();
    assert_eq!(loaded, 1);
    assert_eq!(scheduler.expression(&daily).as_deref(), Some("0 9 * * *"));
    assert!(scheduler.expression(&paused).is_none());
    assert!(scheduler.expression(&broken).is_none());

    let stored = storage.get_task(&daily).await.unwrap().unwrap();
    let next = stored.next_run_at.expect("next run stamped");
    assert!(next.ends_with("T09:00:00.000Z"), "unexpected next run {next}");
}
