// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Threadline plugin architecture.
//!
//! Channels, runners, and storage extend the [`PluginAdapter`] base trait and
//! use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod channel;
pub mod runner;
pub mod storage;
pub mod tasks;

pub use adapter::PluginAdapter;
pub use channel::{
    ChannelAdapter, InteractiveDelivery, ReactionDelivery, RichDelivery, StreamingDelivery,
};
pub use runner::{ChunkStream, Runner, RunnerSession};
pub use storage::StorageAdapter;
pub use tasks::{TaskExecutor, TaskNotifier, TaskSchedule};
