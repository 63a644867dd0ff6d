// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-SHA256 webhook signature verification with replay windows.
//!
//! Each channel signs a canonical string built from a timestamp and the raw
//! body (or a token) with a shared secret. Verification recomputes the MAC,
//! compares it in constant time, and independently rejects timestamps outside
//! the channel's freshness window. Both checks must pass.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use threadline_core::ThreadlineError;

type HmacSha256 = Hmac<Sha256>;

/// Slack rejects requests signed more than five minutes ago.
pub const SLACK_FRESHNESS_WINDOW: Duration = Duration::from_secs(300);

/// Mailgun webhooks are accepted for fifteen minutes.
pub const MAILGUN_FRESHNESS_WINDOW: Duration = Duration::from_secs(900);

/// Slack signature version prefix.
const SLACK_VERSION: &str = "v0";

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Whether `timestamp` lies within `window` of `now` (in either direction).
pub fn is_fresh(timestamp: i64, now: i64, window: Duration) -> bool {
    now.abs_diff(timestamp) <= window.as_secs()
}

/// Computes the lowercase hex HMAC-SHA256 of `message` under `secret`.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded HMAC-SHA256 in constant time.
///
/// Returns `false` for non-hex or wrong-length signatures.
pub fn verify_hmac_sha256_hex(secret: &[u8], message: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Builds the `X-Slack-Signature` value for a request.
pub fn sign_slack_request(signing_secret: &str, timestamp: i64, body: &[u8]) -> String {
    let base = slack_base_string(timestamp, body);
    format!(
        "{SLACK_VERSION}={}",
        hmac_sha256_hex(signing_secret.as_bytes(), &base)
    )
}

fn slack_base_string(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut base = format!("{SLACK_VERSION}:{timestamp}:").into_bytes();
    base.extend_from_slice(body);
    base
}

/// Verifies a Slack request signature (`v0=<hex>` over `v0:{ts}:{body}`).
pub fn verify_slack_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
) -> Result<(), ThreadlineError> {
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| ThreadlineError::Security("malformed slack timestamp".into()))?;
    if !is_fresh(ts, now, SLACK_FRESHNESS_WINDOW) {
        return Err(ThreadlineError::Security(format!(
            "slack timestamp {ts} outside freshness window"
        )));
    }
    let Some(hex_sig) = signature.strip_prefix("v0=") else {
        return Err(ThreadlineError::Security(
            "slack signature missing version prefix".into(),
        ));
    };
    let base = slack_base_string(ts, body);
    if verify_hmac_sha256_hex(signing_secret.as_bytes(), &base, hex_sig) {
        Ok(())
    } else {
        Err(ThreadlineError::Security("slack signature mismatch".into()))
    }
}

/// Builds the Mailgun webhook signature for a timestamp/token pair.
pub fn sign_mailgun(api_key: &str, timestamp: &str, token: &str) -> String {
    hmac_sha256_hex(api_key.as_bytes(), format!("{timestamp}{token}").as_bytes())
}

/// Verifies a Mailgun webhook signature (HMAC over `{timestamp}{token}`).
pub fn verify_mailgun_signature(
    api_key: &str,
    timestamp: &str,
    token: &str,
    signature: &str,
    now: i64,
) -> Result<(), ThreadlineError> {
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| ThreadlineError::Security("malformed mailgun timestamp".into()))?;
    if !is_fresh(ts, now, MAILGUN_FRESHNESS_WINDOW) {
        return Err(ThreadlineError::Security(format!(
            "mailgun timestamp {ts} outside freshness window"
        )));
    }
    let message = format!("{}{token}", timestamp.trim());
    if verify_hmac_sha256_hex(api_key.as_bytes(), message.as_bytes(), signature) {
        Ok(())
    } else {
        Err(ThreadlineError::Security("mailgun signature mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const NOW: i64 = 1_760_000_000;

    #[test]
    fn slack_signature_round_trips() {
        let body = br#"{"type":"event_callback"}"#;
        let sig = sign_slack_request("s1", NOW, body);
        assert!(sig.starts_with("v0="));
        verify_slack_signature("s1", &NOW.to_string(), body, &sig, NOW).unwrap();
    }

    #[test]
    fn slack_rejects_wrong_secret() {
        let body = b"payload";
        let sig = sign_slack_request("s2", NOW, body);
        let err = verify_slack_signature("s1", &NOW.to_string(), body, &sig, NOW).unwrap_err();
        assert!(matches!(err, ThreadlineError::Security(_)));
    }

    #[test]
    fn slack_rejects_stale_but_correctly_signed_request() {
        let stale = NOW - 1000;
        let body = b"payload";
        let sig = sign_slack_request("s1", stale, body);
        assert!(verify_slack_signature("s1", &stale.to_string(), body, &sig, NOW).is_err());
    }

    #[test]
    fn slack_rejects_malformed_inputs() {
        let body = b"payload";
        assert!(verify_slack_signature("s1", "not-a-number", body, "v0=00", NOW).is_err());
        assert!(verify_slack_signature("s1", &NOW.to_string(), body, "zz", NOW).is_err());
        assert!(verify_slack_signature("s1", &NOW.to_string(), body, "v0=xyz", NOW).is_err());
    }

    #[test]
    fn mailgun_signature_round_trips_and_expires() {
        let ts = NOW.to_string();
        let sig = sign_mailgun("key-abc", &ts, "tok123");
        verify_mailgun_signature("key-abc", &ts, "tok123", &sig, NOW).unwrap();
        // Within 900s is fine, beyond is not.
        verify_mailgun_signature("key-abc", &ts, "tok123", &sig, NOW + 899).unwrap();
        assert!(verify_mailgun_signature("key-abc", &ts, "tok123", &sig, NOW + 901).is_err());
        assert!(verify_mailgun_signature("other", &ts, "tok123", &sig, NOW).is_err());
    }

    #[test]
    fn freshness_is_symmetric() {
        let window = Duration::from_secs(300);
        assert!(is_fresh(NOW - 300, NOW, window));
        assert!(is_fresh(NOW + 300, NOW, window));
        assert!(!is_fresh(NOW - 301, NOW, window));
        assert!(!is_fresh(NOW + 301, NOW, window));
    }

    proptest! {
        #[test]
        fn any_other_secret_is_rejected(
            secret in "[a-z0-9]{1,32}",
            other in "[a-z0-9]{1,32}",
            body in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            prop_assume!(secret != other);
            let sig = sign_slack_request(&secret, NOW, &body);
            prop_assert!(verify_slack_signature(&other, &NOW.to_string(), &body, &sig, NOW).is_err());
            prop_assert!(verify_slack_signature(&secret, &NOW.to_string(), &body, &sig, NOW).is_ok());
        }
    }
}
