// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound request verification and secret redaction for Threadline.
//!
//! Channel adapters call into [`signature`] before trusting any webhook;
//! services run log-bound strings through [`redact`].

pub mod redact;
pub mod signature;

pub use redact::{redact, redact_url};
pub use signature::{
    MAILGUN_FRESHNESS_WINDOW, SLACK_FRESHNESS_WINDOW, is_fresh, sign_mailgun, sign_slack_request,
    unix_now, verify_hmac_sha256_hex, verify_mailgun_signature, verify_slack_signature,
};
