// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for Threadline.
//!
//! Serves channel webhooks (verified by each adapter), the bearer-protected
//! `/v1` API for conversations and tasks, and an unauthenticated health
//! check. Conversation turns can be answered as JSON or streamed as SSE.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod sse;

pub use auth::AuthConfig;
pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, HealthState, ServerConfig, router, start_server};
