// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/threadline/threadline.toml`
//! 3. `~/.config/threadline/threadline.toml`
//! 4. `./threadline.toml`
//! 5. `THREADLINE_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ThreadlineConfig;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "THREADLINE_";

/// Top-level sections that environment keys may address.
const SECTIONS: &[&str] = &[
    "agent",
    "storage",
    "gateway",
    "slack",
    "email",
    "anthropic",
    "scheduler",
    "worker",
    "notifications",
];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/threadline/threadline.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "threadline.toml";

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("threadline").join("threadline.toml"))
}

/// Loads configuration from the standard hierarchy with env overrides.
pub fn load_config() -> Result<ThreadlineConfig, figment::Error> {
    build_figment().extract()
}

/// Loads configuration from a TOML string over the defaults. No files, no env.
pub fn load_config_from_str(toml_content: &str) -> Result<ThreadlineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ThreadlineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Loads one explicit file plus env overrides, skipping the XDG lookup.
pub fn load_config_from_path(path: &Path) -> Result<ThreadlineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ThreadlineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered Figment, before extraction.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(ThreadlineConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH));
    if let Some(user) = user_config_path() {
        figment = figment.merge(Toml::file(user));
    }
    figment
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Maps a prefix-stripped, lowercased env key to its dotted config path.
///
/// Only the first underscore after a known section becomes a dot, so
/// `slack_signing_secret` maps to `slack.signing_secret`.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| map_env_key(key.as_str()).into())
}
