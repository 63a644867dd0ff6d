// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound Slack payload parsing.
//!
//! Pure functions that turn Events API callbacks and interactivity payloads
//! into Threadline's normalized types. Network calls live in [`crate::api`].

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};
use threadline_core::ThreadlineError;
use threadline_core::types::{ConversationId, InteractionResponse, ReceivedMessage};

/// Event type tag for Slack message metadata attached to interactive messages.
pub const INTERACTION_EVENT_TYPE: &str = "threadline_interaction";

/// A leading `<@U123>` user mention, with trailing whitespace.
static LEADING_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*<@[A-Z0-9]+(\|[^>]*)?>\s*").unwrap());

fn parse_error(message: impl Into<String>) -> ThreadlineError {
    ThreadlineError::Parse {
        channel: "slack".to_string(),
        message: message.into(),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Returns the `challenge` of a `url_verification` handshake, if this is one.
pub fn url_verification_challenge(payload: &Value) -> Option<&str> {
    if payload.get("type").and_then(Value::as_str) == Some("url_verification") {
        payload.get("challenge").and_then(Value::as_str)
    } else {
        None
    }
}

/// Removes the bot mention from `app_mention` text.
///
/// With a known bot user id every mention of it is removed; otherwise only a
/// leading mention is stripped.
pub fn strip_bot_mention(text: &str, bot_user_id: Option<&str>) -> String {
    match bot_user_id {
        Some(id) if !id.is_empty() => text.replace(&format!("<@{id}>"), "").trim().to_string(),
        _ => LEADING_MENTION.replace(text, "").trim().to_string(),
    }
}

/// Whether an inner event was produced by a bot (including ourselves).
pub fn is_bot_event(event: &Value) -> bool {
    event.get("bot_id").is_some_and(|v| !v.is_null())
        || event.get("subtype").and_then(Value::as_str) == Some("bot_message")
}

/// Parses an Events API `event_callback` body.
///
/// Accepts `app_mention` and plain `message` events. Bot messages, message
/// subtypes (edits, joins, deletions), and other event types are rejected with
/// [`ThreadlineError::Parse`] so the caller acknowledges without acting.
pub fn parse_event(
    payload: &Value,
    bot_user_id: Option<&str>,
) -> Result<ReceivedMessage, ThreadlineError> {
    let outer = str_field(payload, "type");
    if outer != "event_callback" {
        return Err(parse_error(format!("unexpected envelope type: {outer:?}")));
    }
    let event = payload
        .get("event")
        .ok_or_else(|| parse_error("event_callback without event"))?;

    if is_bot_event(event) {
        return Err(parse_error("ignoring bot message"));
    }

    let event_type = str_field(event, "type");
    let content = match event_type {
        "app_mention" => strip_bot_mention(str_field(event, "text"), bot_user_id),
        "message" => {
            if let Some(subtype) = event.get("subtype").and_then(Value::as_str) {
                return Err(parse_error(format!("ignoring message subtype {subtype}")));
            }
            str_field(event, "text").to_string()
        }
        other => return Err(parse_error(format!("unsupported event type: {other:?}"))),
    };

    let ts = str_field(event, "ts");
    let thread_ts = event.get("thread_ts").and_then(Value::as_str);
    let thread_id = thread_ts.unwrap_or(ts);
    if thread_id.is_empty() {
        return Err(parse_error("event has neither thread_ts nor ts"));
    }

    Ok(ReceivedMessage {
        content,
        sender_id: str_field(event, "user").to_string(),
        thread_id: thread_id.to_string(),
        metadata: json!({
            "channel": str_field(event, "channel"),
            "ts": ts,
            "thread_ts": thread_ts,
            "event_type": event_type,
        }),
    })
}

/// Encodes a button value so the conversation id survives the round trip
/// through Slack.
pub fn encode_button_value(conversation_id: &ConversationId, value: &str) -> String {
    json!({ "conversation_id": conversation_id, "value": value }).to_string()
}

/// Parses a `block_actions` interactivity payload (the JSON inside the
/// `payload` form field).
///
/// The conversation id comes from the encoded button value, falling back to
/// the message metadata attached when the interactive message was sent.
pub fn parse_interaction(payload: &Value) -> Result<InteractionResponse, ThreadlineError> {
    let action = payload
        .get("actions")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .ok_or_else(|| parse_error("no actions in interaction payload"))?;

    let raw_value = str_field(action, "value");
    let decoded = serde_json::from_str::<Value>(raw_value)
        .ok()
        .filter(Value::is_object);

    let (conversation_id, value) = match &decoded {
        Some(obj) if obj.get("conversation_id").and_then(Value::as_str).is_some() => (
            str_field(obj, "conversation_id").to_string(),
            str_field(obj, "value").to_string(),
        ),
        _ => {
            let from_metadata = payload
                .pointer("/message/metadata/event_payload/conversation_id")
                .and_then(Value::as_str)
                .ok_or_else(|| parse_error("interaction carries no conversation id"))?;
            (from_metadata.to_string(), raw_value.to_string())
        }
    };

    Ok(InteractionResponse {
        conversation_id: ConversationId::from(conversation_id),
        action_id: str_field(action, "action_id").to_string(),
        value,
        user_id: payload
            .pointer("/user/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}
