// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.
//!
//! Channel webhooks always answer 200 so platforms do not redeliver events
//! that were rejected on purpose; the body reports what happened. The `/v1`
//! API maps errors to status codes through [`ApiError`].

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use threadline_agent::InboundOutcome;
use threadline_core::types::{
    Conversation, INTERACTIVE_PATTERN, Message, NewTask, RawRequest, Task, TaskType, TaskUpdate,
};
use threadline_core::{ConversationId, TaskId, ThreadlineError};

use crate::error::ApiError;
use crate::server::GatewayState;
use crate::sse;

type ApiResult<T> = Result<T, ApiError>;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Registered channel adapters.
    pub channels: Vec<String>,
}

/// Request body for POST /v1/conversations.
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub user_id: String,
    #[serde(default)]
    pub context: Option<Value>,
}

/// Query for GET /v1/conversations/{id}/messages.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Request body for POST /v1/conversations/{id}/messages.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
    /// Stream the reply as SSE. `Accept: text/event-stream` does the same.
    #[serde(default)]
    pub stream: bool,
}

/// Response body for a non-streaming conversation turn.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub conversation_id: ConversationId,
    pub message: String,
}

/// Request body for an outbound channel send.
#[derive(Debug, Deserialize)]
pub struct ChannelSendRequest {
    pub text: String,
}

/// Query for GET /v1/tasks.
#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub user_id: String,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Response body for calls that queue a job.
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub task_id: TaskId,
    pub job_id: i64,
}

/// Copies an axum request into the transport-neutral shape adapters verify.
fn raw_request(headers: &HeaderMap, body: Bytes) -> RawRequest {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
        .fold(RawRequest::new(body.to_vec()), |req, (name, value)| {
            req.with_header(name, value)
        })
}

fn webhook_reply(adapter: &str, result: Result<InboundOutcome, ThreadlineError>) -> Json<Value> {
    match result {
        Ok(InboundOutcome::Challenge(challenge)) => Json(json!({ "challenge": challenge })),
        Ok(InboundOutcome::Dispatched {
            conversation_id, ..
        }) => Json(json!({ "status": "ok", "conversation_id": conversation_id })),
        Err(e) => {
            match &e {
                ThreadlineError::Security(_) | ThreadlineError::Parse { .. } => {
                    tracing::warn!(adapter, error = %e, "webhook acknowledged without processing");
                }
                _ => tracing::error!(adapter, error = %e, "webhook processing failed"),
            }
            // The sender is unauthenticated; details stay in the log.
            Json(json!({ "status": "error" }))
        }
    }
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        channels: state
            .pipeline
            .registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

/// POST /v1/channels/{adapter}/events
pub async fn post_channel_event(
    State(state): State<GatewayState>,
    Path(adapter): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let request = raw_request(&headers, body);
    let result = state.pipeline.handle_event(&adapter, &request).await;
    webhook_reply(&adapter, result)
}

/// POST /v1/channels/{adapter}/interactions
pub async fn post_channel_interaction(
    State(state): State<GatewayState>,
    Path(adapter): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let request = raw_request(&headers, body);
    let result = state.pipeline.handle_interaction(&adapter, &request).await;
    webhook_reply(&adapter, result)
}

/// POST /v1/conversations
pub async fn create_conversation(
    State(state): State<GatewayState>,
    Json(body): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    if body.user_id.trim().is_empty() {
        return Err(ThreadlineError::Validation("user_id is empty".into()).into());
    }
    let mut conversation = Conversation::new(body.user_id, INTERACTIVE_PATTERN);
    if let Some(context) = body.context {
        conversation.context = context;
    }
    state
        .orchestrator
        .storage()
        .create_conversation(&conversation)
        .await?;
    tracing::info!(conversation_id = %conversation.id, "conversation created");
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn load_conversation(
    state: &GatewayState,
    id: &ConversationId,
) -> Result<Conversation, ThreadlineError> {
    state
        .orchestrator
        .storage()
        .get_conversation(id)
        .await?
        .ok_or_else(|| ThreadlineError::not_found("conversation", id.as_str()))
}

/// GET /v1/conversations/{id}
pub async fn get_conversation(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(load_conversation(&state, &ConversationId::from(id)).await?))
}

/// GET /v1/conversations/{id}/messages
pub async fn list_messages(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Message>>> {
    let id = ConversationId::from(id);
    load_conversation(&state, &id).await?;
    let messages = state
        .orchestrator
        .storage()
        .get_messages(&id, page.limit, page.offset)
        .await?;
    Ok(Json(messages))
}

/// POST /v1/conversations/{id}/messages
///
/// Runs an interactive turn. Returns JSON, or an SSE stream when the body
/// sets `stream` or the client accepts `text/event-stream`.
pub async fn post_message(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<Response> {
    if body.message.trim().is_empty() {
        return Err(ThreadlineError::Validation("message is empty".into()).into());
    }
    let id = ConversationId::from(id);
    let wants_stream = body.stream
        || headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("text/event-stream"));

    if wants_stream {
        let stream = state.orchestrator.run_interactive(&id, &body.message).await?;
        let stream = state.orchestrator.record_reply(&id, stream);
        return Ok(sse::stream_reply(id, stream).into_response());
    }

    let message = state
        .orchestrator
        .collect_interactive(&id, &body.message)
        .await?;
    Ok(Json(MessageResponse {
        conversation_id: id,
        message,
    })
    .into_response())
}

/// POST /v1/conversations/{id}/channels/{adapter}/messages
pub async fn send_to_channel(
    State(state): State<GatewayState>,
    Path((id, adapter)): Path<(String, String)>,
    Json(body): Json<ChannelSendRequest>,
) -> ApiResult<Json<Value>> {
    let message_id = state
        .pipeline
        .send_to_adapter(&ConversationId::from(id), &adapter, &body.text)
        .await?;
    Ok(Json(json!({ "message_id": message_id })))
}

/// POST /v1/tasks
pub async fn create_task(
    State(state): State<GatewayState>,
    Json(body): Json<NewTask>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = state.tasks.create_task(body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /v1/tasks?user_id=...
pub async fn list_tasks(
    State(state): State<GatewayState>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let tasks = state
        .tasks
        .list_tasks(&query.user_id)
        .await?
        .into_iter()
        .filter(|t| query.task_type.is_none_or(|kind| t.task_type == kind))
        .filter(|t| query.is_active.is_none_or(|active| t.is_active == active))
        .collect();
    Ok(Json(tasks))
}

/// GET /v1/tasks/{id}
pub async fn get_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.get_task(&TaskId::from(id)).await?))
}

/// PATCH /v1/tasks/{id}
pub async fn update_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(update): Json<TaskUpdate>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.update_task(&TaskId::from(id), &update).await?))
}

/// DELETE /v1/tasks/{id}
pub async fn delete_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.tasks.delete_task(&TaskId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/tasks/{id}/execute
pub async fn execute_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<QueuedResponse>)> {
    let task_id = TaskId::from(id);
    let job_id = state.tasks.execute_now(&task_id).await?;
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse { task_id, job_id })))
}

/// POST /v1/tasks/{id}/disable
pub async fn disable_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.disable_task(&TaskId::from(id)).await?))
}

/// POST /v1/tasks/{id}/enable
pub async fn enable_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.enable_task(&TaskId::from(id)).await?))
}

/// POST /v1/tasks/{id}/trigger
///
/// Any JSON body is carried with the queued job.
pub async fn trigger_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<QueuedResponse>)> {
    let payload = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(&body)
                .map_err(|e| ThreadlineError::Validation(format!("trigger payload: {e}")))?,
        )
    };
    let task_id = TaskId::from(id);
    let job_id = state.tasks.trigger(&task_id, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse { task_id, job_id })))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn raw_request_copies_headers_and_body() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Slack-Signature", HeaderValue::from_static("v0=abc"));
        let req = raw_request(&headers, Bytes::from_static(b"{\"a\":1}"));
        assert_eq!(req.header("x-slack-signature"), Some("v0=abc"));
        assert_eq!(req.json(), Some(json!({"a": 1})));
    }

    #[test]
    fn send_message_request_defaults_to_json() {
        let req: SendMessageRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert!(!req.stream);
    }

    #[test]
    fn list_tasks_query_parses_filters() {
        let q: ListTasksQuery =
            serde_json::from_value(json!({"user_id": "u1", "task_type": "scheduled"})).unwrap();
        assert_eq!(q.task_type, Some(TaskType::Scheduled));
        assert!(q.is_active.is_none());
    }

    #[test]
    fn webhook_errors_are_acknowledged() {
        let Json(body) = webhook_reply("chat", Err(ThreadlineError::Security("bad".into())));
        assert_eq!(body["status"], "error");
    }

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            uptime_secs: 42,
            channels: vec!["slack".into()],
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_secs\":42"));
        assert!(json.contains("slack"));
    }
}
