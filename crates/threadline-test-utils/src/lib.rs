// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Threadline integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockRunner`] - Scripted runner with failure, blocked and streaming modes
//! - [`MockChannel`] - Mock messaging channel with configurable capabilities and call capture
//! - [`RecordingNotifier`] - Task notifier that records instead of delivering
//! - [`TestHarness`] - Temp database plus the full orchestration stack

pub mod harness;
pub mod mock_channel;
pub mod mock_runner;
pub mod notifier;

pub use harness::{TEST_QUEUE, TestHarness, TestHarnessBuilder};
pub use mock_channel::{ChannelCall, MockChannel};
pub use mock_runner::{MockRunner, RunnerCall, RunnerMode};
pub use notifier::{NoticeKind, RecordedNotice, RecordingNotifier};
