// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use threadline_agent::{InboundPipeline, Orchestrator, TaskManager};
use threadline_config::model::GatewayConfig;
use threadline_core::ThreadlineError;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Health state for the unauthenticated health endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Verified inbound channel traffic and outbound sends.
    pub pipeline: Arc<InboundPipeline>,
    /// Interactive API turns.
    pub orchestrator: Arc<Orchestrator>,
    pub tasks: Arc<TaskManager>,
    pub auth: AuthConfig,
    pub health: HealthState,
}

impl GatewayState {
    pub fn new(
        pipeline: Arc<InboundPipeline>,
        orchestrator: Arc<Orchestrator>,
        tasks: Arc<TaskManager>,
        bearer_token: Option<String>,
    ) -> Self {
        Self {
            pipeline,
            orchestrator,
            tasks,
            auth: AuthConfig { bearer_token },
            health: HealthState {
                start_time: std::time::Instant::now(),
            },
        }
    }
}

/// Gateway server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl From<&GatewayConfig> for ServerConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
        }
    }
}

/// Builds the gateway router.
///
/// - GET /health (public)
/// - POST /v1/channels/{adapter}/events, /interactions (adapter-verified)
/// - /v1/conversations and /v1/tasks (bearer token)
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    // Webhooks carry channel signatures instead of the API token.
    let webhook_routes = Router::new()
        .route(
            "/v1/channels/{adapter}/events",
            post(handlers::post_channel_event),
        )
        .route(
            "/v1/channels/{adapter}/interactions",
            post(handlers::post_channel_interaction),
        )
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/conversations", post(handlers::create_conversation))
        .route("/v1/conversations/{id}", get(handlers::get_conversation))
        .route(
            "/v1/conversations/{id}/messages",
            get(handlers::list_messages).post(handlers::post_message),
        )
        .route(
            "/v1/conversations/{id}/channels/{adapter}/messages",
            post(handlers::send_to_channel),
        )
        .route(
            "/v1/tasks",
            post(handlers::create_task).get(handlers::list_tasks),
        )
        .route(
            "/v1/tasks/{id}",
            get(handlers::get_task)
                .patch(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/v1/tasks/{id}/execute", post(handlers::execute_task))
        .route("/v1/tasks/{id}/disable", post(handlers::disable_task))
        .route("/v1/tasks/{id}/enable", post(handlers::enable_task))
        .route("/v1/tasks/{id}/trigger", post(handlers::trigger_task))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serves the gateway until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), ThreadlineError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ThreadlineError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| ThreadlineError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_from_gateway_config() {
        let gateway = GatewayConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 3000,
            bearer_token: Some("t".into()),
        };
        let config = ServerConfig::from(&gateway);
        assert_eq!(config.port, 3000);
        let debug = format!("{config:?}");
        assert!(debug.contains("127.0.0.1"));
        assert!(!debug.contains("bearer"));
    }
}
