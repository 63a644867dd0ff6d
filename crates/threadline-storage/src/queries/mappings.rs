// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel mapping operations.
//!
//! `(adapter_name, thread_id)` is unique, so exactly one conversation owns
//! any external thread. Losing an insert race is reported, not raised.

use rusqlite::{ErrorCode, Row, params};
use threadline_core::ThreadlineError;
use threadline_core::types::ConversationId;

use crate::database::Database;
use crate::models::{ChannelMapping, parse_json, to_json};

const COLUMNS: &str = "conversation_id, adapter_name, thread_id, metadata, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ChannelMapping> {
    Ok(ChannelMapping {
        conversation_id: ConversationId(row.get(0)?),
        adapter_name: row.get(1)?,
        thread_id: row.get(2)?,
        metadata: parse_json(3, row.get(3)?)?,
        created_at: row.get(4)?,
    })
}

/// Insert a mapping. Returns `false` when a uniqueness constraint rejected it.
pub async fn insert_channel_mapping(
    db: &Database,
    mapping: &ChannelMapping,
) -> Result<bool, ThreadlineError> {
    let m = mapping.clone();
    db.connection()
        .call(move |conn| {
            let result = conn.execute(
                "INSERT INTO channel_mappings (conversation_id, adapter_name, thread_id, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    m.conversation_id.as_str(),
                    m.adapter_name,
                    m.thread_id,
                    to_json(&m.metadata)?,
                    m.created_at,
                ],
            );
            match result {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation
                        && e.extended_code != rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
                {
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The mapping that owns an external thread, if any.
pub async fn find_mapping_by_thread(
    db: &Database,
    adapter_name: &str,
    thread_id: &str,
) -> Result<Option<ChannelMapping>, ThreadlineError> {
    let adapter_name = adapter_name.to_string();
    let thread_id = thread_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {COLUMNS} FROM channel_mappings WHERE adapter_name = ?1 AND thread_id = ?2"
            );
            match conn.query_row(&sql, params![adapter_name, thread_id], from_row) {
                Ok(m) => Ok(Some(m)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The mapping a conversation holds on one adapter, if any.
pub async fn find_mapping(
    db: &Database,
    conversation_id: &ConversationId,
    adapter_name: &str,
) -> Result<Option<ChannelMapping>, ThreadlineError> {
    let conversation_id = conversation_id.as_str().to_string();
    let adapter_name = adapter_name.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {COLUMNS} FROM channel_mappings WHERE conversation_id = ?1 AND adapter_name = ?2"
            );
            match conn.query_row(&sql, params![conversation_id, adapter_name], from_row) {
                Ok(m) => Ok(Some(m)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Every mapping of a conversation, oldest first.
pub async fn list_mappings(
    db: &Database,
    conversation_id: &ConversationId,
) -> Result<Vec<ChannelMapping>, ThreadlineError> {
    let conversation_id = conversation_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {COLUMNS} FROM channel_mappings WHERE conversation_id = ?1 ORDER BY rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![conversation_id], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use threadline_core::types::now_timestamp;

    use super::*;
    use crate::queries::test_support::{seed_conversation, setup_db};

    fn mapping(conversation_id: &ConversationId, adapter: &str, thread: &str) -> ChannelMapping {
        ChannelMapping {
            conversation_id: conversation_id.clone(),
            adapter_name: adapter.to_string(),
            thread_id: thread.to_string(),
            metadata: json!({"channel": "C1"}),
            created_at: now_timestamp(),
        }
    }

    #[tokio::test]
    async fn second_owner_of_a_thread_is_rejected() {
        let (db, _dir) = setup_db().await;
        let first = seed_conversation(&db, "a").await;
        let second = seed_conversation(&db, "b").await;

        assert!(insert_channel_mapping(&db, &mapping(&first.id, "slack", "T1")).await.unwrap());
        assert!(!insert_channel_mapping(&db, &mapping(&second.id, "slack", "T1")).await.unwrap());

        let owner = find_mapping_by_thread(&db, "slack", "T1").await.unwrap().unwrap();
        assert_eq!(owner.conversation_id, first.id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn one_mapping_per_adapter_per_conversation() {
        let (db, _dir) = setup_db().await;
        let conversation = seed_conversation(&db, "a").await;

        assert!(insert_channel_mapping(&db, &mapping(&conversation.id, "slack", "T1")).await.unwrap());
        assert!(!insert_channel_mapping(&db, &mapping(&conversation.id, "slack", "T2")).await.unwrap());
        assert!(insert_channel_mapping(&db, &mapping(&conversation.id, "email", "<m@x>")).await.unwrap());

        let all = list_mappings(&db, &conversation.id).await.unwrap();
        assert_eq!(all.len(), 2);
        let email = find_mapping(&db, &conversation.id, "email").await.unwrap().unwrap();
        assert_eq!(email.thread_id, "<m@x>");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_conversation_is_an_error_not_a_lost_race() {
        let (db, _dir) = setup_db().await;
        let result = insert_channel_mapping(&db, &mapping(&ConversationId::new(), "slack", "T9")).await;
        assert!(result.is_err());
        db.close().await.unwrap();
    }
}
