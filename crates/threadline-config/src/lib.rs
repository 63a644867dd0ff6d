// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for Threadline.
//!
//! Strict TOML parsing (`deny_unknown_fields`), XDG file lookup, `THREADLINE_`
//! environment overrides, and miette diagnostics with typo suggestions.
//!
//! ```no_run
//! use threadline_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("listening on {}:{}", config.gateway.host, config.gateway.port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::ThreadlineConfig;

/// Loads the layered configuration and validates it.
pub fn load_and_validate() -> Result<ThreadlineConfig, Vec<ConfigError>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Loads an explicit config file (plus env overrides) and validates it.
pub fn load_and_validate_path(path: &Path) -> Result<ThreadlineConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Parses and validates an inline TOML document.
pub fn load_and_validate_str(toml_content: &str) -> Result<ThreadlineConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

fn finish(
    loaded: Result<ThreadlineConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<ThreadlineConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    let display = std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string();
    Some((display, content))
}

/// Source text of every config file that exists, for span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut paths = vec![Path::new(loader::LOCAL_CONFIG_PATH).to_path_buf()];
    paths.extend(loader::user_config_path());
    paths.push(Path::new(loader::SYSTEM_CONFIG_PATH).to_path_buf());
    paths.iter().filter_map(|p| read_source(p)).collect()
}
