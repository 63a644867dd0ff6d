// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities, plus column conversion helpers.
//!
//! The canonical types live in `threadline_core::types`; this module
//! re-exports them and maps enum and JSON columns to and from TEXT.

use std::str::FromStr;

use rusqlite::types::Type;

pub use threadline_core::types::{
    ChannelMapping, Conversation, ConversationStatus, Message, MessageRole, NotificationConfig,
    QueueEntry, Task, TaskStatus, TaskType,
};

/// Parses a strum-backed enum stored as TEXT.
pub(crate) fn parse_enum<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parses a JSON document stored as TEXT.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: String,
) -> rusqlite::Result<T> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parses a nullable JSON column.
pub(crate) fn parse_json_opt<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: Option<String>,
) -> rusqlite::Result<Option<T>> {
    raw.map(|r| parse_json(idx, r)).transpose()
}

/// Serializes a value for a JSON TEXT column.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

pub(crate) fn to_json_opt<T: serde::Serialize>(
    value: Option<&T>,
) -> rusqlite::Result<Option<String>> {
    value.map(to_json).transpose()
}
