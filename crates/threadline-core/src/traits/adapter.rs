// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that all plugin adapters must implement.

use async_trait::async_trait;

use crate::error::ThreadlineError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all Threadline adapters.
///
/// Channels, runners, and storage backends share this identity, lifecycle,
/// and health check surface.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the registry name of this adapter instance (e.g. `slack`).
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the type of adapter.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, ThreadlineError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), ThreadlineError>;
}
