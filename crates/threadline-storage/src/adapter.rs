// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use threadline_config::model::StorageConfig;
use threadline_core::types::{
    ChannelMapping, Conversation, ConversationStatus, Message, QueueEntry, Task, TaskStatus,
};
use threadline_core::{
    AdapterType, ConversationId, HealthStatus, PluginAdapter, StorageAdapter, TaskId,
    ThreadlineError,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened on [`StorageAdapter::initialize`]; every other
/// call fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Opens a storage rooted at `path` and initializes it.
    pub async fn open(path: &str) -> Result<Self, ThreadlineError> {
        let storage = Self::new(StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        });
        storage.initialize().await?;
        Ok(storage)
    }

    fn db(&self) -> Result<&Database, ThreadlineError> {
        self.db.get().ok_or_else(|| ThreadlineError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self) -> Result<(), ThreadlineError> {
        if let Some(db) = self.db.get() {
            db.connection()
                .call(|conn| -> Result<(), rusqlite::Error> {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
                })
                .await
                .map_err(crate::database::map_tr_err)?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ThreadlineError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch("SELECT 1;") })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ThreadlineError> {
        self.checkpoint().await
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ThreadlineError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ThreadlineError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ThreadlineError> {
        self.db()?;
        self.checkpoint().await
    }

    // --- Conversation operations ---

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), ThreadlineError> {
        queries::conversations::create_conversation(self.db()?, conversation).await
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ThreadlineError> {
        queries::conversations::get_conversation(self.db()?, id).await
    }

    async fn update_conversation_status(
        &self,
        id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<(), ThreadlineError> {
        queries::conversations::update_conversation_status(self.db()?, id, status).await
    }

    async fn update_conversation_context(
        &self,
        id: &ConversationId,
        context: &serde_json::Value,
    ) -> Result<(), ThreadlineError> {
        queries::conversations::update_conversation_context(self.db()?, id, context).await
    }

    async fn link_conversation_task(
        &self,
        id: &ConversationId,
        task_id: &TaskId,
    ) -> Result<(), ThreadlineError> {
        queries::conversations::link_conversation_task(self.db()?, id, task_id).await
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), ThreadlineError> {
        queries::conversations::delete_conversation(self.db()?, id).await
    }

    // --- Message operations ---

    async fn insert_message(&self, message: &Message) -> Result<(), ThreadlineError> {
        queries::messages::insert_message(self.db()?, message).await
    }

    async fn get_messages(
        &self,
        conversation_id: &ConversationId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Message>, ThreadlineError> {
        queries::messages::get_messages(self.db()?, conversation_id, limit, offset).await
    }

    async fn get_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: i64,
    ) -> Result<Vec<Message>, ThreadlineError> {
        queries::messages::get_recent_messages(self.db()?, conversation_id, limit).await
    }

    // --- Channel mapping operations ---

    async fn insert_channel_mapping(&self, mapping: &ChannelMapping) -> Result<bool, ThreadlineError> {
        queries::mappings::insert_channel_mapping(self.db()?, mapping).await
    }

    async fn find_mapping_by_thread(
        &self,
        adapter_name: &str,
        thread_id: &str,
    ) -> Result<Option<ChannelMapping>, ThreadlineError> {
        queries::mappings::find_mapping_by_thread(self.db()?, adapter_name, thread_id).await
    }

    async fn find_mapping(
        &self,
        conversation_id: &ConversationId,
        adapter_name: &str,
    ) -> Result<Option<ChannelMapping>, ThreadlineError> {
        queries::mappings::find_mapping(self.db()?, conversation_id, adapter_name).await
    }

    async fn list_mappings(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ChannelMapping>, ThreadlineError> {
        queries::mappings::list_mappings(self.db()?, conversation_id).await
    }

    // --- Task operations ---

    async fn create_task(&self, task: &Task) -> Result<(), ThreadlineError> {
        queries::tasks::create_task(self.db()?, task).await
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, ThreadlineError> {
        queries::tasks::get_task(self.db()?, id).await
    }

    async fn get_task_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Task>, ThreadlineError> {
        queries::tasks::get_task_by_conversation(self.db()?, conversation_id).await
    }

    async fn list_tasks_for_user(&self, user_id: &str) -> Result<Vec<Task>, ThreadlineError> {
        queries::tasks::list_tasks_for_user(self.db()?, user_id).await
    }

    async fn list_scheduled_tasks(&self) -> Result<Vec<Task>, ThreadlineError> {
        queries::tasks::list_scheduled_tasks(self.db()?).await
    }

    async fn update_task_config(&self, task: &Task) -> Result<bool, ThreadlineError> {
        queries::tasks::update_task_config(self.db()?, task).await
    }

    async fn set_task_active(&self, id: &TaskId, active: bool) -> Result<(), ThreadlineError> {
        queries::tasks::set_task_active(self.db()?, id, active).await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), ThreadlineError> {
        queries::tasks::delete_task(self.db()?, id).await
    }

    async fn claim_task(&self, id: &TaskId) -> Result<bool, ThreadlineError> {
        queries::tasks::claim_task(self.db()?, id).await
    }

    async fn finish_task(
        &self,
        id: &TaskId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<(), ThreadlineError> {
        queries::tasks::finish_task(self.db()?, id, status, error_message).await
    }

    async fn rearm_task(&self, id: &TaskId, occurrence: Option<&str>) -> Result<bool, ThreadlineError> {
        queries::tasks::rearm_task(self.db()?, id, occurrence).await
    }

    async fn resume_blocked_task(&self, id: &TaskId) -> Result<bool, ThreadlineError> {
        queries::tasks::resume_blocked_task(self.db()?, id).await
    }

    async fn fail_interrupted_tasks(&self, reason: &str) -> Result<usize, ThreadlineError> {
        queries::tasks::fail_interrupted_tasks(self.db()?, reason).await
    }

    async fn set_task_next_run(
        &self,
        id: &TaskId,
        next_run_at: Option<&str>,
    ) -> Result<(), ThreadlineError> {
        queries::tasks::set_task_next_run(self.db()?, id, next_run_at).await
    }

    // --- Queue operations ---

    async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, ThreadlineError> {
        queries::queue::enqueue(self.db()?, queue_name, payload).await
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, ThreadlineError> {
        queries::queue::dequeue(self.db()?, queue_name).await
    }

    async fn ack(&self, id: i64) -> Result<(), ThreadlineError> {
        queries::queue::ack(self.db()?, id).await
    }

    async fn fail(&self, id: i64) -> Result<(), ThreadlineError> {
        queries::queue::fail(self.db()?, id).await
    }
}

#[cfg(test)]
mod tests {
    use threadline_core::types::MessageRole;

    use super::*;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_identifies_itself() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn calls_fail_before_initialize() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        assert!(storage.health_check().await.is_err());
        assert!(storage.get_task(&TaskId::new()).await.is_err());
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists());
        assert!(storage.initialize().await.is_err());
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn deleting_a_conversation_cascades() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::open(dir.path().join("c.db").to_str().unwrap())
            .await
            .unwrap();

        let conversation = Conversation::new("u", "channel_adapter");
        storage.create_conversation(&conversation).await.unwrap();
        storage
            .insert_message(&Message::new(&conversation.id, MessageRole::User, "hi"))
            .await
            .unwrap();
        storage
            .insert_channel_mapping(&ChannelMapping {
                conversation_id: conversation.id.clone(),
                adapter_name: "slack".into(),
                thread_id: "T1".into(),
                metadata: serde_json::json!({}),
                created_at: threadline_core::types::now_timestamp(),
            })
            .await
            .unwrap();

        storage.delete_conversation(&conversation.id).await.unwrap();
        assert!(storage.find_mapping_by_thread("slack", "T1").await.unwrap().is_none());
        assert!(
            storage
                .get_messages(&conversation.id, None, None)
                .await
                .unwrap()
                .is_empty()
        );
        storage.close().await.unwrap();
    }
}
