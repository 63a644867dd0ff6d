// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends (SQLite, etc.).

use async_trait::async_trait;

use crate::error::ThreadlineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChannelMapping, Conversation, ConversationId, ConversationStatus, Message, QueueEntry, Task,
    TaskId, TaskStatus,
};

/// Adapter for storage and persistence backends.
///
/// Owns conversations, messages, channel mappings, tasks, and the background
/// job queue. Implementations must enforce uniqueness of
/// `(adapter_name, thread_id)` across channel mappings at the storage level.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), ThreadlineError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), ThreadlineError>;

    // --- Conversation operations ---

    async fn create_conversation(&self, conversation: &Conversation)
    -> Result<(), ThreadlineError>;

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, ThreadlineError>;

    async fn update_conversation_status(
        &self,
        id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<(), ThreadlineError>;

    async fn update_conversation_context(
        &self,
        id: &ConversationId,
        context: &serde_json::Value,
    ) -> Result<(), ThreadlineError>;

    async fn link_conversation_task(
        &self,
        id: &ConversationId,
        task_id: &TaskId,
    ) -> Result<(), ThreadlineError>;

    /// Deletes a conversation together with its messages and mappings.
    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), ThreadlineError>;

    // --- Message operations ---

    async fn insert_message(&self, message: &Message) -> Result<(), ThreadlineError>;

    /// Messages of a conversation in the order they were produced.
    async fn get_messages(
        &self,
        conversation_id: &ConversationId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Message>, ThreadlineError>;

    /// The newest `limit` messages, oldest first. Used to build runner history.
    async fn get_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: i64,
    ) -> Result<Vec<Message>, ThreadlineError>;

    // --- Channel mapping operations ---

    /// Inserts a mapping. Returns `false` when another mapping already owns
    /// the `(adapter_name, thread_id)` pair.
    async fn insert_channel_mapping(
        &self,
        mapping: &ChannelMapping,
    ) -> Result<bool, ThreadlineError>;

    async fn find_mapping_by_thread(
        &self,
        adapter_name: &str,
        thread_id: &str,
    ) -> Result<Option<ChannelMapping>, ThreadlineError>;

    async fn find_mapping(
        &self,
        conversation_id: &ConversationId,
        adapter_name: &str,
    ) -> Result<Option<ChannelMapping>, ThreadlineError>;

    async fn list_mappings(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ChannelMapping>, ThreadlineError>;

    // --- Task operations ---

    async fn create_task(&self, task: &Task) -> Result<(), ThreadlineError>;

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, ThreadlineError>;

    async fn get_task_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Task>, ThreadlineError>;

    async fn list_tasks_for_user(&self, user_id: &str) -> Result<Vec<Task>, ThreadlineError>;

    /// Active scheduled tasks carrying a schedule expression.
    async fn list_scheduled_tasks(&self) -> Result<Vec<Task>, ThreadlineError>;

    /// Writes the editable fields of `task`. Returns `false` if the task is
    /// running (or missing) and nothing was written.
    async fn update_task_config(&self, task: &Task) -> Result<bool, ThreadlineError>;

    async fn set_task_active(&self, id: &TaskId, active: bool) -> Result<(), ThreadlineError>;

    async fn delete_task(&self, id: &TaskId) -> Result<(), ThreadlineError>;

    /// Atomically moves an active `pending` task to `running`, stamping the
    /// start and last-run times. Returns `false` if another caller got there
    /// first or the task is not claimable.
    async fn claim_task(&self, id: &TaskId) -> Result<bool, ThreadlineError>;

    /// Records the outcome of a running task (`completed`, `failed`, or `blocked`).
    async fn finish_task(
        &self,
        id: &TaskId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<(), ThreadlineError>;

    /// Returns a terminal task to `pending`. With `occurrence`, only tasks
    /// whose last run precedes it are re-armed.
    async fn rearm_task(
        &self,
        id: &TaskId,
        occurrence: Option<&str>,
    ) -> Result<bool, ThreadlineError>;

    /// Moves a `blocked` task back to `pending`.
    async fn resume_blocked_task(&self, id: &TaskId) -> Result<bool, ThreadlineError>;

    /// Marks tasks still `running` from a previous process as `failed`.
    async fn fail_interrupted_tasks(&self, reason: &str) -> Result<usize, ThreadlineError>;

    async fn set_task_next_run(
        &self,
        id: &TaskId,
        next_run_at: Option<&str>,
    ) -> Result<(), ThreadlineError>;

    // --- Queue operations ---

    /// Enqueues a job and returns its id.
    async fn enqueue(&self, queue_name: &str, payload: &str) -> Result<i64, ThreadlineError>;

    /// Claims the oldest pending job, if any.
    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueueEntry>, ThreadlineError>;

    async fn ack(&self, id: i64) -> Result<(), ThreadlineError>;

    async fn fail(&self, id: i64) -> Result<(), ThreadlineError>;
}
