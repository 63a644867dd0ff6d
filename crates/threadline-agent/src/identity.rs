// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation identity mapping.
//!
//! Maps an external `(adapter, thread)` pair onto one internal conversation.
//! The storage uniqueness constraint on `(adapter_name, thread_id)` is the
//! only arbiter: when two deliveries of the same thread race, the losing
//! writer discards the conversation it created and adopts the winner's.

use std::sync::Arc;

use serde_json::json;
use threadline_core::types::{CHANNEL_ADAPTER_PATTERN, ChannelMapping, Conversation, now_timestamp};
use threadline_core::{ConversationId, StorageAdapter, ThreadlineError};
use tracing::{debug, info, warn};

/// Resolves external threads to conversations.
#[derive(Clone)]
pub struct ConversationResolver {
    storage: Arc<dyn StorageAdapter>,
}

impl ConversationResolver {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Returns the conversation mapped to `(adapter_name, thread_id)`,
    /// creating it on first sight.
    ///
    /// Idempotent across redeliveries and concurrent callers.
    pub async fn resolve_or_create(
        &self,
        adapter_name: &str,
        thread_id: &str,
        sender_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<ConversationId, ThreadlineError> {
        if let Some(mapping) = self
            .storage
            .find_mapping_by_thread(adapter_name, thread_id)
            .await?
        {
            debug!(
                adapter = adapter_name,
                thread_id,
                conversation_id = %mapping.conversation_id,
                "thread already mapped"
            );
            return Ok(mapping.conversation_id);
        }

        let mut conversation = Conversation::new(sender_id, CHANNEL_ADAPTER_PATTERN);
        conversation.context = json!({
            "adapter_name": adapter_name,
            "thread_id": thread_id,
        });
        self.storage.create_conversation(&conversation).await?;

        let mapping = ChannelMapping {
            conversation_id: conversation.id.clone(),
            adapter_name: adapter_name.to_string(),
            thread_id: thread_id.to_string(),
            metadata: metadata.clone(),
            created_at: now_timestamp(),
        };
        if self.storage.insert_channel_mapping(&mapping).await? {
            info!(
                adapter = adapter_name,
                thread_id,
                conversation_id = %conversation.id,
                "conversation created for new thread"
            );
            return Ok(conversation.id);
        }

        // Lost the race: another delivery mapped this thread first.
        self.storage.delete_conversation(&conversation.id).await?;
        let winner = self
            .storage
            .find_mapping_by_thread(adapter_name, thread_id)
            .await?
            .ok_or(ThreadlineError::DuplicateMapping {
                adapter_name: adapter_name.to_string(),
                thread_id: thread_id.to_string(),
            })?;
        warn!(
            adapter = adapter_name,
            thread_id,
            orphan = %conversation.id,
            conversation_id = %winner.conversation_id,
            "duplicate thread mapping resolved to existing conversation"
        );
        Ok(winner.conversation_id)
    }

    /// The mapping used to reply to a conversation on `adapter_name`.
    pub async fn lookup(
        &self,
        conversation_id: &ConversationId,
        adapter_name: &str,
    ) -> Result<Option<ChannelMapping>, ThreadlineError> {
        self.storage.find_mapping(conversation_id, adapter_name).await
    }
}

#[cfg(test)]
mod tests {
    use threadline_storage::SqliteStorage;

    use super::*;

    async fn resolver() -> (ConversationResolver, Arc<dyn StorageAdapter>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.db");
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(SqliteStorage::open(path.to_str().unwrap()).await.unwrap());
        (ConversationResolver::new(storage.clone()), storage, dir)
    }

    #[tokio::test]
    async fn redelivery_yields_same_conversation() {
        let (resolver, storage, _dir) = resolver().await;
        let meta = json!({"channel": "C1"});
        let first = resolver
            .resolve_or_create("chat", "T1", "U1", &meta)
            .await
            .unwrap();
        let second = resolver
            .resolve_or_create("chat", "T1", "U1", &meta)
            .await
            .unwrap();
        assert_eq!(first, second);

        let conversation = storage.get_conversation(&first).await.unwrap().unwrap();
        assert_eq!(conversation.pattern, CHANNEL_ADAPTER_PATTERN);
        assert_eq!(conversation.context["thread_id"], "T1");
        assert_eq!(storage.list_mappings(&first).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn distinct_threads_get_distinct_conversations() {
        let (resolver, _storage, _dir) = resolver().await;
        let a = resolver
            .resolve_or_create("chat", "T1", "U1", &json!({}))
            .await
            .unwrap();
        let b = resolver
            .resolve_or_create("chat", "T2", "U1", &json!({}))
            .await
            .unwrap();
        let c = resolver
            .resolve_or_create("mail", "T1", "U1", &json!({}))
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn concurrent_first_deliveries_converge() {
        let (resolver, storage, _dir) = resolver().await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                resolver
                    .resolve_or_create("chat", "T-race", "U1", &json!({}))
                    .await
                    .unwrap()
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "all callers must agree: {ids:?}");

        let mapping = storage
            .find_mapping_by_thread("chat", "T-race")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mapping.conversation_id, ids[0]);
    }

    #[tokio::test]
    async fn lookup_returns_thread_and_metadata() {
        let (resolver, _storage, _dir) = resolver().await;
        let id = resolver
            .resolve_or_create("chat", "T9", "U1", &json!({"channel": "C9"}))
            .await
            .unwrap();
        let mapping = resolver.lookup(&id, "chat").await.unwrap().unwrap();
        assert_eq!(mapping.thread_id, "T9");
        assert_eq!(mapping.metadata["channel"], "C9");
        assert!(resolver.lookup(&id, "mail").await.unwrap().is_none());
    }
}
