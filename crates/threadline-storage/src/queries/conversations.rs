// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation CRUD operations.

use rusqlite::{Row, params};
use threadline_core::ThreadlineError;
use threadline_core::types::{ConversationId, TaskId};

use crate::database::Database;
use crate::models::{Conversation, ConversationStatus, parse_enum, parse_json, to_json};

const COLUMNS: &str = "id, user_id, status, pattern, context, task_id, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: ConversationId(row.get(0)?),
        user_id: row.get(1)?,
        status: parse_enum(2, row.get(2)?)?,
        pattern: row.get(3)?,
        context: parse_json(4, row.get(4)?)?,
        task_id: row.get::<_, Option<String>>(5)?.map(TaskId),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Insert a new conversation.
pub async fn create_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<(), ThreadlineError> {
    let c = conversation.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, status, pattern, context, task_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    c.id.as_str(),
                    c.user_id,
                    c.status.to_string(),
                    c.pattern,
                    to_json(&c.context)?,
                    c.task_id.as_ref().map(|t| t.as_str().to_string()),
                    c.created_at,
                    c.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a conversation by ID.
pub async fn get_conversation(
    db: &Database,
    id: &ConversationId,
) -> Result<Option<Conversation>, ThreadlineError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {COLUMNS} FROM conversations WHERE id = ?1");
            match conn.query_row(&sql, params![id], from_row) {
                Ok(c) => Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set the lifecycle status and bump `updated_at`.
pub async fn update_conversation_status(
    db: &Database,
    id: &ConversationId,
    status: ConversationStatus,
) -> Result<(), ThreadlineError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET status = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![status.to_string(), id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Replace the context document.
pub async fn update_conversation_context(
    db: &Database,
    id: &ConversationId,
    context: &serde_json::Value,
) -> Result<(), ThreadlineError> {
    let id = id.as_str().to_string();
    let context = context.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET context = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![to_json(&context)?, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record which task owns the conversation.
pub async fn link_conversation_task(
    db: &Database,
    id: &ConversationId,
    task_id: &TaskId,
) -> Result<(), ThreadlineError> {
    let id = id.as_str().to_string();
    let task_id = task_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET task_id = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![task_id, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a conversation. Messages, mappings, and tasks cascade.
pub async fn delete_conversation(db: &Database, id: &ConversationId) -> Result<(), ThreadlineError> {
    let id = id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::queries::test_support::setup_db;

    #[tokio::test]
    async fn create_and_get_round_trips_context() {
        let (db, _dir) = setup_db().await;
        let mut conversation = Conversation::new("slack:U1", "channel_adapter");
        conversation.context = json!({"adapter_name": "slack", "thread_id": "1700.01"});
        create_conversation(&db, &conversation).await.unwrap();

        let loaded = get_conversation(&db, &conversation.id).await.unwrap().unwrap();
        assert_eq!(loaded, conversation);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let (db, _dir) = setup_db().await;
        let missing = get_conversation(&db, &ConversationId::new()).await.unwrap();
        assert!(missing.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn status_and_task_link_update() {
        let (db, _dir) = setup_db().await;
        let conversation = Conversation::new("u", "delegation");
        create_conversation(&db, &conversation).await.unwrap();

        let task_id = TaskId::new();
        update_conversation_status(&db, &conversation.id, ConversationStatus::Waiting)
            .await
            .unwrap();
        link_conversation_task(&db, &conversation.id, &task_id).await.unwrap();

        let loaded = get_conversation(&db, &conversation.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ConversationStatus::Waiting);
        assert_eq!(loaded.task_id, Some(task_id));
        db.close().await.unwrap();
    }
}
