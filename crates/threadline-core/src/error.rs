// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Threadline orchestration framework.

use thiserror::Error;

/// The primary error type used across all Threadline traits and core operations.
#[derive(Debug, Error)]
pub enum ThreadlineError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Outbound channel transport errors (HTTP failure, platform rejection).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Signature or replay-window verification failed for an inbound request.
    #[error("security verification failed: {0}")]
    Security(String),

    /// An inbound event did not match any shape the channel recognizes.
    #[error("failed to parse {channel} event: {message}")]
    Parse { channel: String, message: String },

    /// Input was structurally valid but missing required values.
    #[error("validation error: {0}")]
    Validation(String),

    /// A capability was exercised that the component does not advertise.
    #[error("{component} does not support {capability}")]
    NotCapable {
        component: String,
        capability: String,
    },

    /// The runner failed while producing a response.
    #[error("execution error: {message}")]
    Execution {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Another writer already mapped this external thread.
    #[error("thread {thread_id} on {adapter_name} is already mapped")]
    DuplicateMapping {
        adapter_name: String,
        thread_id: String,
    },

    /// Requested adapter was not found in the registry.
    #[error("adapter not found: {adapter_type}/{name}")]
    AdapterNotFound { adapter_type: String, name: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The operation is not permitted in the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A notification could not be delivered on one channel.
    #[error("notification via {channel} failed: {message}")]
    Notification { channel: String, message: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ThreadlineError {
    /// Builds an [`ThreadlineError::Execution`] without an underlying source.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a [`ThreadlineError::Channel`] without an underlying source.
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a [`ThreadlineError::NotFound`] for the given entity kind.
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    /// Returns true for runner failures the task layer records as `failed`.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::Timeout { .. })
    }
}
