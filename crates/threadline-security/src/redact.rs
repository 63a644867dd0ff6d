// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret redaction for log output and error messages.
//!
//! Two complementary mechanisms:
//! 1. **Regex-based**: catches known secret formats (Slack tokens, webhook URLs, API keys).
//! 2. **Exact-match**: catches configured secrets loaded at runtime.

use std::sync::LazyLock;

use regex::Regex;

/// Known secret patterns to redact from output.
static REDACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Slack incoming webhook URLs embed their credential in the path.
        Regex::new(r"https://hooks\.slack\.com/services/[A-Za-z0-9/_\-]+").unwrap(),
        // Slack bot/user/app tokens: xoxb-..., xoxp-..., xapp-...
        Regex::new(r"xox[abprs]-[A-Za-z0-9\-]{10,}").unwrap(),
        Regex::new(r"xapp-[A-Za-z0-9\-]{10,}").unwrap(),
        // Anthropic API keys: sk-ant-api03-...
        Regex::new(r"sk-ant-[a-zA-Z0-9_\-]{20,}").unwrap(),
        // Mailgun private keys.
        Regex::new(r"key-[0-9a-f]{32}").unwrap(),
        // Bearer tokens in headers
        Regex::new(r"Bearer\s+[a-zA-Z0-9._\-]{10,}").unwrap(),
    ]
});

/// The redaction placeholder.
pub const REDACTED: &str = "[REDACTED]";

/// Redact secrets from a string using regex patterns and exact-match values.
pub fn redact(input: &str, secrets: &[String]) -> String {
    let mut result = input.to_string();

    for pattern in REDACTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, REDACTED).to_string();
    }

    // Longest first so a secret that contains another is replaced whole.
    let mut sorted: Vec<&String> = secrets.iter().collect();
    sorted.sort_by_key(|v| std::cmp::Reverse(v.len()));
    for value in sorted {
        if !value.is_empty() {
            result = result.replace(value.as_str(), REDACTED);
        }
    }

    result
}

/// Redacts a URL down to its scheme and host for logging.
///
/// Falls back to full pattern redaction when the input does not parse.
pub fn redact_url(input: &str) -> String {
    match url::Url::parse(input) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("{}://{host}/{REDACTED}", parsed.scheme()),
            None => REDACTED.to_string(),
        },
        Err(_) => redact(input, &[]),
    }
}
