// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every problem rather than failing on the first one.

use std::net::IpAddr;

use crate::diagnostic::ConfigError;
use crate::model::ThreadlineConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validates a deserialized configuration for semantic correctness.
pub fn validate_config(config: &ThreadlineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::validation(
            "agent",
            format!(
                "log_level `{}` must be one of {}",
                config.agent.log_level,
                LOG_LEVELS.join(", ")
            ),
        ));
    }
    if config.agent.runner_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "agent",
            "runner_timeout_secs must be greater than zero",
        ));
    }
    if config.agent.history_limit < 0 {
        errors.push(ConfigError::validation(
            "agent",
            format!(
                "history_limit must be non-negative, got {}",
                config.agent.history_limit
            ),
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage",
            "database_path must not be empty",
        ));
    }

    let host = config.gateway.host.trim();
    let hostname_like = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
    if host.parse::<IpAddr>().is_err() && !hostname_like {
        errors.push(ConfigError::validation(
            "gateway",
            format!("host `{host}` is not a valid IP address or hostname"),
        ));
    }
    if matches!(&config.gateway.bearer_token, Some(t) if t.trim().is_empty()) {
        errors.push(ConfigError::validation(
            "gateway",
            "bearer_token must not be empty when set",
        ));
    }

    // A bot token without a signing secret would accept unverified webhooks.
    if config.slack.bot_token.is_some() && config.slack.signing_secret.is_none() {
        errors.push(ConfigError::validation(
            "slack",
            "signing_secret is required when bot_token is set",
        ));
    }
    check_url(&mut errors, "slack", "api_base_url", &config.slack.api_base_url);

    if config.email.api_key.is_some() != config.email.domain.is_some() {
        errors.push(ConfigError::validation(
            "email",
            "api_key and domain must be set together",
        ));
    }
    check_url(&mut errors, "email", "api_base_url", &config.email.api_base_url);
    if let Some(from) = &config.email.from_address
        && !from.contains('@')
    {
        errors.push(ConfigError::validation(
            "email",
            format!("from_address `{from}` is not an email address"),
        ));
    }

    if config.anthropic.max_tokens == 0 || config.anthropic.max_concurrent_requests == 0 {
        errors.push(ConfigError::validation(
            "anthropic",
            "max_tokens and max_concurrent_requests must be greater than zero",
        ));
    }

    if config.scheduler.tick_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "scheduler",
            "tick_interval_secs must be greater than zero",
        ));
    }

    if config.worker.queue_name.trim().is_empty() {
        errors.push(ConfigError::validation(
            "worker",
            "queue_name must not be empty",
        ));
    }
    if config.worker.poll_interval_ms == 0 || config.worker.job_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "worker",
            "poll_interval_ms and job_timeout_secs must be greater than zero",
        ));
    }

    if !config.notifications.from_address.contains('@') {
        errors.push(ConfigError::validation(
            "notifications",
            format!(
                "from_address `{}` is not an email address",
                config.notifications.from_address
            ),
        ));
    }
    if config.notifications.smtp_username.is_some() != config.notifications.smtp_password.is_some()
    {
        errors.push(ConfigError::validation(
            "notifications",
            "smtp_username and smtp_password must be set together",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ConfigError>, section: &str, key: &str, value: &str) {
    if !(value.starts_with("https://") || value.starts_with("http://")) {
        errors.push(ConfigError::validation(
            section,
            format!("{key} `{value}` must be an http(s) URL"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &ThreadlineConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&ThreadlineConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails() {
        let mut config = ThreadlineConfig::default();
        config.storage.database_path = " ".into();
        assert!(messages(&config).iter().any(|m| m.contains("database_path")));
    }

    #[test]
    fn slack_token_requires_signing_secret() {
        let mut config = ThreadlineConfig::default();
        config.slack.bot_token = Some("xoxb-1".into());
        assert!(messages(&config).iter().any(|m| m.starts_with("slack:")));

        config.slack.signing_secret = Some("s".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ThreadlineConfig::default();
        config.agent.log_level = "loud".into();
        config.scheduler.tick_interval_secs = 0;
        config.email.domain = Some("mg.example.com".into());
        assert_eq!(messages(&config).len(), 3);
    }

    #[test]
    fn rejects_bad_gateway_host() {
        let mut config = ThreadlineConfig::default();
        config.gateway.host = "bad host!".into();
        assert!(messages(&config).iter().any(|m| m.contains("host")));
        config.gateway.host = "::1".into();
        assert!(validate_config(&config).is_ok());
    }
}
