// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter registry.
//!
//! Adapters are collected by a [`ChannelRegistryBuilder`] during startup and
//! frozen into a read-only [`ChannelRegistry`]. The frozen registry has no
//! mutating methods, so nothing can be registered after the services that
//! share it have started.

use std::collections::BTreeMap;
use std::sync::Arc;

use threadline_core::{ChannelAdapter, HealthStatus, ThreadlineError};
use tracing::{info, warn};

/// Collects channel adapters before the registry is frozen.
#[derive(Default)]
pub struct ChannelRegistryBuilder {
    channels: BTreeMap<String, Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an adapter under its own [`name`](threadline_core::PluginAdapter::name).
    ///
    /// Registering two adapters with the same name is a configuration error.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) -> Result<(), ThreadlineError> {
        let name = adapter.name().to_string();
        if self.channels.contains_key(&name) {
            return Err(ThreadlineError::Config(format!(
                "channel adapter `{name}` registered twice"
            )));
        }
        info!(channel = %name, caps = ?adapter.capabilities(), "channel adapter registered");
        self.channels.insert(name, adapter);
        Ok(())
    }

    /// Chained form of [`register`](Self::register).
    pub fn with(mut self, adapter: Arc<dyn ChannelAdapter>) -> Result<Self, ThreadlineError> {
        self.register(adapter)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Freezes the registry.
    pub fn build(self) -> Arc<ChannelRegistry> {
        Arc::new(ChannelRegistry {
            channels: self.channels,
        })
    }
}

/// Read-only lookup of channel adapters by name.
pub struct ChannelRegistry {
    channels: BTreeMap<String, Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    /// Returns the adapter registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ChannelAdapter>, ThreadlineError> {
        self.channels
            .get(name)
            .cloned()
            .ok_or_else(|| ThreadlineError::AdapterNotFound {
                adapter_type: "channel".into(),
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Registered adapter names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Health of every adapter. A failing health probe is reported as unhealthy.
    pub async fn health(&self) -> Vec<(String, HealthStatus)> {
        let mut report = Vec::with_capacity(self.channels.len());
        for (name, channel) in &self.channels {
            let status = match channel.health_check().await {
                Ok(status) => status,
                Err(e) => HealthStatus::Unhealthy(e.to_string()),
            };
            report.push((name.clone(), status));
        }
        report
    }

    /// Shuts every adapter down, logging failures.
    pub async fn shutdown(&self) {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.shutdown().await {
                warn!(channel = %name, error = %e, "channel shutdown error");
            }
        }
    }
}
