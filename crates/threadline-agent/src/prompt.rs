// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel-aware system instructions.

use threadline_core::{ChannelCapabilities, MessageStyle};

const CONVERSATIONAL_GUIDANCE: &str = "Channel context: you are replying on a real-time chat platform.

Guidelines:
- Keep replies short and conversational
- Ask at most one clarifying question at a time; the user can answer quickly
- Prefer short paragraphs and bullet lists
- Expect a quick back-and-forth rather than one long answer";

const COMPREHENSIVE_GUIDANCE: &str = "Channel context: you are replying over email or another asynchronous channel.

Guidelines:
- Give complete, self-contained answers
- Anticipate follow-up questions and answer them up front
- If you need information, ask every clarifying question in this single reply
- Organise longer replies into clear sections with headings
- Assume the reader may not respond for some time";

/// Builds the system instruction for a reply on a channel with `caps`.
pub fn channel_system_prompt(base: &str, caps: &ChannelCapabilities) -> String {
    let mut prompt = base.trim_end().to_string();
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str(match caps.message_style {
        MessageStyle::Conversational => CONVERSATIONAL_GUIDANCE,
        MessageStyle::Comprehensive => COMPREHENSIVE_GUIDANCE,
    });
    if caps.supports_rich_formatting {
        prompt.push_str("\n- Markdown formatting is rendered on this channel");
    }
    if caps.supports_interactive_elements {
        prompt.push_str("\n- You may offer a short list of choices; they can be shown as buttons");
    }
    if let Some(max) = caps.max_message_length {
        prompt.push_str(&format!("\n- Keep each reply under {max} characters"));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversational_channels_ask_one_question_at_a_time() {
        let caps = ChannelCapabilities::minimal();
        let prompt = channel_system_prompt("You are a helpful assistant.", &caps);
        assert!(prompt.starts_with("You are a helpful assistant.\n\n"));
        assert!(prompt.contains("one clarifying question at a time"));
        assert!(!prompt.contains("Markdown"));
        assert!(!prompt.contains("buttons"));
    }

    #[test]
    fn comprehensive_channels_front_load_questions() {
        let caps = ChannelCapabilities {
            message_style: MessageStyle::Comprehensive,
            supports_rich_formatting: true,
            ..ChannelCapabilities::minimal()
        };
        let prompt = channel_system_prompt("", &caps);
        assert!(prompt.starts_with("Channel context: you are replying over email"));
        assert!(prompt.contains("every clarifying question in this single reply"));
        assert!(prompt.contains("Markdown formatting is rendered"));
    }

    #[test]
    fn interactive_and_length_notes() {
        let caps = ChannelCapabilities {
            supports_interactive_elements: true,
            max_message_length: Some(4000),
            ..ChannelCapabilities::minimal()
        };
        let prompt = channel_system_prompt("base", &caps);
        assert!(prompt.contains("shown as buttons"));
        assert!(prompt.ends_with("under 4000 characters"));
    }
}
