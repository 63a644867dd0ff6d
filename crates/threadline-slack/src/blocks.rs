// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Block Kit construction and mrkdwn formatting.
//!
//! Slack's mrkdwn is not CommonMark: bold is `*x*`, links are `<url|text>`,
//! and `&`, `<`, `>` must be escaped. Runner output is CommonMark-ish, so it
//! is converted before it lands in a section block.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};
use threadline_core::types::{Button, ConversationId, InteractiveMessage, RichMessage};

use crate::handler::encode_button_value;

/// Section block text limit.
pub const SECTION_TEXT_LIMIT: usize = 3000;

/// Elements allowed in one `actions` block.
const ACTIONS_PER_BLOCK: usize = 25;

/// Button label limit.
const BUTTON_LABEL_LIMIT: usize = 75;

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.+?)~~").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").unwrap());
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\((https?://[^)\s]+)\)").unwrap());

/// Escapes the three characters Slack treats as control sequences.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Converts CommonMark-style emphasis, headings, and links to mrkdwn.
pub fn to_mrkdwn(text: &str) -> String {
    let escaped = escape(text);
    let linked = LINK.replace_all(&escaped, "<$2|$1>");
    let headed = HEADING.replace_all(&linked, "*$1*");
    let bolded = BOLD.replace_all(&headed, "*$1*");
    STRIKE.replace_all(&bolded, "~$1~").into_owned()
}

/// Truncates `text` to at most `max` characters on a char boundary.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Splits text into pieces that each fit a section block, preferring line breaks.
fn split_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.chars().count() + line.chars().count() > SECTION_TEXT_LIMIT
            && !current.is_empty()
        {
            sections.push(std::mem::take(&mut current));
        }
        if line.chars().count() > SECTION_TEXT_LIMIT {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(SECTION_TEXT_LIMIT) {
                sections.push(piece.iter().collect());
            }
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        sections.push(current);
    }
    sections
}

fn section(text: &str) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } })
}

/// Block Kit blocks for a rich message.
///
/// `formatting` may carry ready-made blocks (an array, or an object with a
/// `blocks` array); otherwise the text is converted to mrkdwn sections.
pub fn rich_blocks(message: &RichMessage) -> Vec<Value> {
    let supplied = match &message.formatting {
        Value::Array(blocks) => Some(blocks.clone()),
        Value::Object(map) => map.get("blocks").and_then(Value::as_array).cloned(),
        _ => None,
    };
    match supplied {
        Some(blocks) if !blocks.is_empty() => blocks,
        _ => split_sections(&to_mrkdwn(&message.text))
            .iter()
            .map(|s| section(s))
            .collect(),
    }
}

fn button_element(button: &Button, conversation_id: &ConversationId) -> Value {
    json!({
        "type": "button",
        "text": { "type": "plain_text", "text": truncate(&button.label, BUTTON_LABEL_LIMIT) },
        "action_id": button.action_id,
        "value": encode_button_value(conversation_id, &button.value),
    })
}

/// A text section followed by `actions` blocks holding the buttons.
pub fn interactive_blocks(
    message: &InteractiveMessage,
    conversation_id: &ConversationId,
) -> Vec<Value> {
    let mut blocks: Vec<Value> = split_sections(&to_mrkdwn(&message.text))
        .iter()
        .map(|s| section(s))
        .collect();
    for group in message.buttons.chunks(ACTIONS_PER_BLOCK) {
        let elements: Vec<Value> = group
            .iter()
            .map(|b| button_element(b, conversation_id))
            .collect();
        blocks.push(json!({ "type": "actions", "elements": elements }));
    }
    blocks
}
