// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cron scheduling for Threadline scheduled tasks.
//!
//! [`CronScheduler`] keeps the standing registrations, computes occurrences
//! with `croner`, and drives the task executor from a cancellable tick loop.

pub mod expression;
pub mod scheduler;

use std::time::Duration;

use threadline_config::model::SchedulerConfig;

pub use scheduler::{CronScheduler, DueJob};

/// Builds a scheduler from the `[scheduler]` section.
pub fn from_config(config: &SchedulerConfig) -> CronScheduler {
    CronScheduler::new(Duration::from_secs(config.tick_interval_secs))
}
