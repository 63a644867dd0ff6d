// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`ThreadlineError`] to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use threadline_core::ThreadlineError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

/// A [`ThreadlineError`] returned from an API handler.
#[derive(Debug)]
pub struct ApiError(pub ThreadlineError);

impl From<ThreadlineError> for ApiError {
    fn from(e: ThreadlineError) -> Self {
        Self(e)
    }
}

/// HTTP status for an error surfaced to an API caller.
pub fn status_for(error: &ThreadlineError) -> StatusCode {
    match error {
        ThreadlineError::NotFound { .. } | ThreadlineError::AdapterNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        ThreadlineError::Validation(_) | ThreadlineError::Parse { .. } => StatusCode::BAD_REQUEST,
        ThreadlineError::InvalidState(_) | ThreadlineError::DuplicateMapping { .. } => {
            StatusCode::CONFLICT
        }
        ThreadlineError::Security(_) => StatusCode::UNAUTHORIZED,
        ThreadlineError::NotCapable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ThreadlineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ThreadlineError::Execution { .. } | ThreadlineError::Channel { .. } => {
            StatusCode::BAD_GATEWAY
        }
        ThreadlineError::Config(_)
        | ThreadlineError::Storage { .. }
        | ThreadlineError::Notification { .. }
        | ThreadlineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "api request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "api request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(
            status_for(&ThreadlineError::not_found("task", "t1")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ThreadlineError::Validation("empty".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ThreadlineError::InvalidState("running".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn runner_errors_map_to_gateway_statuses() {
        assert_eq!(
            status_for(&ThreadlineError::Timeout {
                duration: Duration::from_secs(1)
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&ThreadlineError::execution("boom")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&ThreadlineError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_response_serializes() {
        let resp = ErrorResponse {
            error: "something went wrong".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("something went wrong"));
    }
}
