// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across Threadline adapter traits and services.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Current UTC time in the fixed-width format stored in SQLite.
///
/// Matches `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` so timestamps written from
/// Rust and from SQL compare correctly as strings.
pub fn now_timestamp() -> String {
    format_timestamp(&chrono::Utc::now())
}

/// Formats a UTC datetime in the storage timestamp format.
pub fn format_timestamp(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Internal, channel-agnostic conversation identifier.
    ConversationId
);
string_id!(
    /// Background task identifier.
    TaskId
);
string_id!(
    /// Persisted message identifier.
    MessageId
);

/// Health status of an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// The kind of adapter a plugin provides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum AdapterType {
    /// External messaging surface (Slack, email).
    Channel,
    /// Execution backend producing replies.
    Runner,
    /// Persistence backend.
    Storage,
}

// --- Inbound channel traffic ---

/// Raw transport request handed to a channel adapter.
///
/// Header names are stored lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    headers: HashMap<String, String>,
    /// Unmodified request body; signatures are computed over these bytes.
    pub body: Vec<u8>,
}

impl RawRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Adds a header, lowercasing its name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The body as UTF-8, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// The body parsed as JSON, if it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// The body decoded as `application/x-www-form-urlencoded` fields.
    ///
    /// Later occurrences of a repeated key win.
    pub fn form_fields(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }
}

/// A channel event normalized into the internal message shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub content: String,
    pub sender_id: String,
    /// External thread identifier used for conversation mapping.
    pub thread_id: String,
    /// Channel-specific data needed to address a reply.
    pub metadata: serde_json::Value,
}

/// Structured content with a plain-text fallback for clients that cannot render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichMessage {
    pub text: String,
    pub fallback_text: String,
    /// Channel-native formatting payload (Block Kit blocks, HTML body).
    pub formatting: serde_json::Value,
}

/// A clickable element attached to an interactive message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub action_id: String,
    pub value: String,
    pub label: String,
}

/// A message carrying interactive elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveMessage {
    pub text: String,
    pub buttons: Vec<Button>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A user's interaction with an interactive element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionResponse {
    pub conversation_id: ConversationId,
    pub action_id: String,
    pub value: String,
    pub user_id: String,
}

// --- Runner exchange types ---

/// Role of a message within a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// A tool invocation requested by a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A history entry passed to a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl From<&Message> for AgentMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = message
            .tool_calls
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls,
        }
    }
}

/// Token accounting reported by a runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One increment of a streamed runner response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Finish reasons a runner uses to report that it needs user input.
pub const BLOCKED_FINISH_REASONS: &[&str] = &["needs_input", "blocked"];

/// Complete result of a non-streaming runner call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub token_usage: Option<TokenUsage>,
    pub metadata: Option<serde_json::Value>,
}

impl ExecutionResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        }
    }

    /// True when the runner reported that it cannot continue without user input.
    pub fn is_blocked(&self) -> bool {
        self.finish_reason
            .as_deref()
            .is_some_and(|r| BLOCKED_FINISH_REASONS.contains(&r))
    }
}

/// Per-call execution parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub conversation_id: Option<ConversationId>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub additional_params: serde_json::Map<String, serde_json::Value>,
}

// --- Persisted entities ---

/// Lifecycle status of a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Active,
    Completed,
    Failed,
    Waiting,
}

/// Origin tag recorded on conversations created for channel traffic.
pub const CHANNEL_ADAPTER_PATTERN: &str = "channel_adapter";

/// Origin tag recorded on conversations created through the API.
pub const INTERACTIVE_PATTERN: &str = "interactive";

/// An internal, channel-agnostic dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: String,
    pub status: ConversationStatus,
    /// Free-form origin tag (interactive, delegation, scheduled, ...).
    pub pattern: String,
    pub context: serde_json::Value,
    pub task_id: Option<TaskId>,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    /// A new active conversation stamped with the current time.
    pub fn new(user_id: impl Into<String>, pattern: impl Into<String>) -> Self {
        let now = now_timestamp();
        Self {
            id: ConversationId::new(),
            user_id: user_id.into(),
            status: ConversationStatus::Active,
            pattern: pattern.into(),
            context: serde_json::json!({}),
            task_id: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A single persisted message. Messages are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub tool_calls: Option<serde_json::Value>,
    pub tool_results: Option<serde_json::Value>,
    /// Channel adapter that carried this message, if any.
    pub adapter_name: Option<String>,
    /// Adapter-native identifier of the message on that channel.
    pub adapter_message_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

impl Message {
    pub fn new(
        conversation_id: &ConversationId,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id: conversation_id.clone(),
            role,
            content: content.into(),
            tool_calls: None,
            tool_results: None,
            adapter_name: None,
            adapter_message_id: None,
            metadata: None,
            created_at: now_timestamp(),
        }
    }

    /// Records the channel that carried this message.
    pub fn with_provenance(mut self, adapter_name: &str, adapter_message_id: Option<String>) -> Self {
        self.adapter_name = Some(adapter_name.to_string());
        self.adapter_message_id = adapter_message_id;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// True when the message was persisted from an abandoned stream.
    pub fn is_incomplete(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("incomplete"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Association between a conversation and a channel's native thread.
///
/// `(adapter_name, thread_id)` is unique across all mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMapping {
    pub conversation_id: ConversationId,
    pub adapter_name: String,
    pub thread_id: String,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

/// Kind of background work a task performs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskType {
    Delegation,
    Scheduled,
    Triggered,
}

/// Task lifecycle state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Blocked,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One destination for task notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationChannel {
    Email { address: String },
    Slack { webhook_url: String },
    Webhook { url: String },
}

impl NotificationChannel {
    /// Short channel name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Email { .. } => "email",
            Self::Slack { .. } => "slack",
            Self::Webhook { .. } => "webhook",
        }
    }
}

/// Ordered set of notification destinations for a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationConfig {
    pub channels: Vec<NotificationChannel>,
}

impl NotificationConfig {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// A unit of non-interactive work bound 1:1 to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: String,
    pub conversation_id: ConversationId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub prompt: String,
    /// Cron expression for scheduled tasks.
    pub schedule: Option<String>,
    pub trigger_config: Option<serde_json::Value>,
    pub notifications: NotificationConfig,
    pub is_active: bool,
    pub last_run_at: Option<String>,
    pub next_run_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub user_id: String,
    pub task_type: TaskType,
    pub prompt: String,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub trigger_config: Option<serde_json::Value>,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Configuration edits permitted while a task is not running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub trigger_config: Option<serde_json::Value>,
    #[serde(default)]
    pub notifications: Option<NotificationConfig>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl TaskUpdate {
    /// Applies the edits to a task in place.
    pub fn apply(&self, task: &mut Task) {
        if let Some(prompt) = &self.prompt {
            task.prompt = prompt.clone();
        }
        if let Some(schedule) = &self.schedule {
            task.schedule = Some(schedule.clone());
        }
        if let Some(trigger) = &self.trigger_config {
            task.trigger_config = Some(trigger.clone());
        }
        if let Some(notifications) = &self.notifications {
            task.notifications = notifications.clone();
        }
        if let Some(active) = self.is_active {
            task.is_active = active;
        }
    }
}

/// An entry in the crash-safe background job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: String,
    pub updated_at: String,
    pub locked_until: Option<String>,
}

/// What a single `execute` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskOutcome {
    /// The task was inactive, missing, or not pending; nothing ran.
    Skipped,
    Completed,
    Failed,
    Blocked,
}
