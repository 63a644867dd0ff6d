// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestration layer for the Threadline framework.
//!
//! This crate is the central coordinator that:
//! - Holds the frozen [`ChannelRegistry`] of channel adapters
//! - Maps external threads onto conversations ([`ConversationResolver`])
//! - Verifies, parses and persists inbound channel traffic ([`InboundPipeline`])
//! - Drives runners and relays replies back through channels ([`Orchestrator`])
//! - Runs delegated, scheduled and triggered work ([`TaskManager`], [`TaskWorker`])
//! - Handles graceful shutdown

pub mod dispatch;
pub mod identity;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod shutdown;
pub mod tasks;
pub mod worker;

pub use identity::ConversationResolver;
pub use orchestrator::{COMPLETION_REACTION, Orchestrator, OrchestratorSettings};
pub use pipeline::{InboundOutcome, InboundPipeline};
pub use registry::{ChannelRegistry, ChannelRegistryBuilder};
pub use tasks::TaskManager;
pub use worker::{ExecuteJob, JobResult, TaskWorker};
