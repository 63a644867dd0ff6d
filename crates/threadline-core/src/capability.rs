// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability descriptors for channel adapters and runners.
//!
//! Descriptors are static value objects. The orchestrator reads them to pick
//! between code paths and to decide which optional facets it may touch; a
//! flag set to `false` means the matching facet is never invoked.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How a channel prefers the agent to pace its replies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageStyle {
    /// Short turns, one clarifying question at a time (chat platforms).
    #[default]
    Conversational,
    /// Batched, exhaustive replies with clarification up front (email).
    Comprehensive,
}

/// Features a channel adapter supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCapabilities {
    pub supports_streaming: bool,
    pub supports_threading: bool,
    pub supports_rich_formatting: bool,
    pub supports_interactive_elements: bool,
    pub supports_reactions: bool,
    pub supports_editing: bool,
    pub supports_attachments: bool,
    pub message_style: MessageStyle,
    /// Platform limit on a single message body, if any.
    pub max_message_length: Option<usize>,
}

impl ChannelCapabilities {
    /// A plain-text channel with no optional facets.
    pub const fn minimal() -> Self {
        Self {
            supports_streaming: false,
            supports_threading: false,
            supports_rich_formatting: false,
            supports_interactive_elements: false,
            supports_reactions: false,
            supports_editing: false,
            supports_attachments: false,
            message_style: MessageStyle::Conversational,
            max_message_length: None,
        }
    }
}

impl Default for ChannelCapabilities {
    fn default() -> Self {
        Self::minimal()
    }
}

/// Features an execution backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerCapabilities {
    pub supports_streaming: bool,
    pub supports_tool_use: bool,
    pub supports_vision: bool,
    pub supports_system_prompt_override: bool,
    pub supports_conversation_history: bool,
    pub context_window: Option<u32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for RunnerCapabilities {
    fn default() -> Self {
        Self {
            supports_streaming: true,
            supports_tool_use: false,
            supports_vision: false,
            supports_system_prompt_override: true,
            supports_conversation_history: true,
            context_window: None,
            max_output_tokens: None,
        }
    }
}
