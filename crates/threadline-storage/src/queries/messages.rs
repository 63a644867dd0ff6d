// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message operations. Messages are append-only and read back in insertion
//! order, which is the order they were produced.

use rusqlite::{Row, params};
use threadline_core::ThreadlineError;
use threadline_core::types::{ConversationId, MessageId};

use crate::database::Database;
use crate::models::{Message, parse_enum, parse_json_opt, to_json_opt};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(row.get(0)?),
        conversation_id: ConversationId(row.get(1)?),
        role: parse_enum(2, row.get(2)?)?,
        content: row.get(3)?,
        tool_calls: parse_json_opt(4, row.get(4)?)?,
        tool_results: parse_json_opt(5, row.get(5)?)?,
        adapter_name: row.get(6)?,
        adapter_message_id: row.get(7)?,
        metadata: parse_json_opt(8, row.get(8)?)?,
        created_at: row.get(9)?,
    })
}

/// Insert a new message.
pub async fn insert_message(db: &Database, msg: &Message) -> Result<(), ThreadlineError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, tool_calls, tool_results,
                                       adapter_name, adapter_message_id, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    msg.id.as_str(),
                    msg.conversation_id.as_str(),
                    msg.role.to_string(),
                    msg.content,
                    to_json_opt(msg.tool_calls.as_ref())?,
                    to_json_opt(msg.tool_results.as_ref())?,
                    msg.adapter_name,
                    msg.adapter_message_id,
                    to_json_opt(msg.metadata.as_ref())?,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Messages of a conversation, oldest first.
///
/// `limit` and `offset` page through the sequence; a missing limit returns
/// everything from `offset` on.
pub async fn get_messages(
    db: &Database,
    conversation_id: &ConversationId,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<Message>, ThreadlineError> {
    let conversation_id = conversation_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, tool_calls, tool_results,
                        adapter_name, adapter_message_id, metadata, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY seq ASC LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(
                params![conversation_id, limit.unwrap_or(-1), offset.unwrap_or(0)],
                from_row,
            )?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The most recent `limit` messages, returned oldest first.
pub async fn get_recent_messages(
    db: &Database,
    conversation_id: &ConversationId,
    limit: i64,
) -> Result<Vec<Message>, ThreadlineError> {
    let conversation_id = conversation_id.as_str().to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, tool_calls, tool_results,
                        adapter_name, adapter_message_id, metadata, created_at
                 FROM (SELECT * FROM messages WHERE conversation_id = ?1
                       ORDER BY seq DESC LIMIT ?2)
                 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id, limit], from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use threadline_core::types::MessageRole;

    use super::*;
    use crate::queries::test_support::{seed_conversation, setup_db};

    #[tokio::test]
    async fn messages_come_back_in_insertion_order() {
        let (db, _dir) = setup_db().await;
        let conversation = seed_conversation(&db, "u1").await;

        for i in 0..5 {
            let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
            insert_message(&db, &Message::new(&conversation.id, role, format!("m{i}")))
                .await
                .unwrap();
        }

        let all = get_messages(&db, &conversation.id, None, None).await.unwrap();
        let contents: Vec<_> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m0", "m1", "m2", "m3", "m4"]);

        let page = get_messages(&db, &conversation.id, Some(2), Some(1)).await.unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m1", "m2"]);

        let recent = get_recent_messages(&db, &conversation.id, 2).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m3", "m4"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn provenance_and_metadata_persist() {
        let (db, _dir) = setup_db().await;
        let conversation = seed_conversation(&db, "u1").await;
        let msg = Message::new(&conversation.id, MessageRole::Assistant, "partial")
            .with_provenance("slack", Some("1700.0002".into()))
            .with_metadata(json!({"incomplete": true}));
        insert_message(&db, &msg).await.unwrap();

        let loaded = get_messages(&db, &conversation.id, None, None).await.unwrap();
        assert_eq!(loaded, vec![msg]);
        assert!(loaded[0].is_incomplete());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn insert_into_unknown_conversation_fails() {
        let (db, _dir) = setup_db().await;
        let orphan = Message::new(&ConversationId::new(), MessageRole::User, "hi");
        assert!(insert_message(&db, &orphan).await.is_err());
        db.close().await.unwrap();
    }
}
