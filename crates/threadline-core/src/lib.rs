// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Threadline orchestration framework.
//!
//! This crate provides the capability descriptors, trait definitions, error
//! types, and domain types shared throughout the workspace. Channel adapters,
//! runners, and storage backends implement traits defined here.

pub mod capability;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use capability::{ChannelCapabilities, MessageStyle, RunnerCapabilities};
pub use error::ThreadlineError;
pub use types::{AdapterType, ConversationId, HealthStatus, MessageId, TaskId};

pub use traits::{
    ChannelAdapter, ChunkStream, InteractiveDelivery, PluginAdapter, ReactionDelivery,
    RichDelivery, Runner, RunnerSession, StorageAdapter, StreamingDelivery, TaskExecutor,
    TaskNotifier, TaskSchedule,
};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::types::{
        ExecutionResult, Message, MessageRole, NotificationChannel, NotificationConfig,
        RawRequest, TaskStatus, TaskUpdate,
    };

    #[test]
    fn adapter_type_display_round_trips() {
        for variant in [AdapterType::Channel, AdapterType::Runner, AdapterType::Storage] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn task_status_terminality() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert_eq!(TaskStatus::from_str("blocked").unwrap(), TaskStatus::Blocked);
    }

    #[test]
    fn blocked_finish_reasons_are_recognized() {
        let mut result = ExecutionResult::text("need the report date");
        assert!(!result.is_blocked());
        result.finish_reason = Some("needs_input".into());
        assert!(result.is_blocked());
        result.finish_reason = Some("blocked".into());
        assert!(result.is_blocked());
    }

    #[test]
    fn raw_request_headers_are_case_insensitive() {
        let req = RawRequest::new("a=1&b=two+words").with_header("X-Slack-Signature", "v0=abc");
        assert_eq!(req.header("x-slack-signature"), Some("v0=abc"));
        assert_eq!(req.header("X-SLACK-SIGNATURE"), Some("v0=abc"));
        let form = req.form_fields();
        assert_eq!(form.get("b").map(String::as_str), Some("two words"));
    }

    #[test]
    fn notification_config_serializes_as_tagged_list() {
        let config = NotificationConfig {
            channels: vec![
                NotificationChannel::Email {
                    address: "ops@example.com".into(),
                },
                NotificationChannel::Webhook {
                    url: "https://hooks.example.com/t".into(),
                },
            ],
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json[0]["kind"], "email");
        assert_eq!(json[1]["url"], "https://hooks.example.com/t");
    }

    #[test]
    fn incomplete_flag_reads_from_metadata() {
        let conv = ConversationId::new();
        let msg = Message::new(&conv, MessageRole::Assistant, "partial")
            .with_metadata(serde_json::json!({"incomplete": true}));
        assert!(msg.is_incomplete());
        assert!(!Message::new(&conv, MessageRole::User, "hi").is_incomplete());
    }

    #[test]
    fn task_update_only_touches_provided_fields() {
        let mut task = crate::types::Task {
            id: TaskId::new(),
            user_id: "u1".into(),
            conversation_id: ConversationId::new(),
            task_type: crate::types::TaskType::Scheduled,
            status: TaskStatus::Pending,
            prompt: "old".into(),
            schedule: Some("0 9 * * *".into()),
            trigger_config: None,
            notifications: NotificationConfig::default(),
            is_active: true,
            last_run_at: None,
            next_run_at: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: types::now_timestamp(),
            updated_at: types::now_timestamp(),
        };
        TaskUpdate {
            prompt: Some("new".into()),
            ..Default::default()
        }
        .apply(&mut task);
        assert_eq!(task.prompt, "new");
        assert_eq!(task.schedule.as_deref(), Some("0 9 * * *"));
        assert!(task.is_active);
    }
}
