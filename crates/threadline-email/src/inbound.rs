// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of Mailgun inbound-route webhooks.

use std::collections::HashMap;

use serde_json::json;
use threadline_core::ThreadlineError;
use threadline_core::types::ReceivedMessage;

use crate::format;

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Resolves the thread an inbound email belongs to.
///
/// The first `References` entry names the thread root and survives any
/// number of replies. Without it, `In-Reply-To` and finally the message's own
/// id are used.
pub fn thread_id(fields: &HashMap<String, String>) -> Option<String> {
    field(fields, "References")
        .and_then(|refs| refs.split_whitespace().next())
        .or_else(|| field(fields, "In-Reply-To"))
        .or_else(|| field(fields, "message-id"))
        .or_else(|| field(fields, "Message-Id"))
        .map(str::to_string)
}

/// Parses the form fields Mailgun posts for a routed message.
pub fn parse_inbound(fields: &HashMap<String, String>) -> Result<ReceivedMessage, ThreadlineError> {
    let message_id = field(fields, "message-id")
        .or_else(|| field(fields, "Message-Id"))
        .ok_or_else(|| ThreadlineError::Parse {
            channel: "email".into(),
            message: "inbound email has no message-id".into(),
        })?;

    let content = match field(fields, "body-plain") {
        Some(plain) => plain.to_string(),
        None => field(fields, "body-html")
            .map(format::html_to_text)
            .unwrap_or_default(),
    };

    let from_addr = field(fields, "from").unwrap_or_default();
    let sender = field(fields, "sender").unwrap_or(from_addr);
    let cc: Vec<&str> = field(fields, "Cc")
        .map(|cc| cc.split(',').map(str::trim).filter(|a| !a.is_empty()).collect())
        .unwrap_or_default();
    let attachment_count: u32 = field(fields, "attachment-count")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    Ok(ReceivedMessage {
        content,
        sender_id: sender.to_string(),
        thread_id: thread_id(fields).unwrap_or_else(|| message_id.to_string()),
        metadata: json!({
            "message_id": message_id,
            "in_reply_to": field(fields, "In-Reply-To"),
            "subject": field(fields, "subject").unwrap_or_default(),
            "from_addr": from_addr,
            "to_addr": field(fields, "recipient").unwrap_or_default(),
            "cc": cc,
            "attachment_count": attachment_count,
        }),
    })
}
