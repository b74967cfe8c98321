//! HTTP surface: WebSocket upgrade, message ingestion, thread reads, health.
//!
//! | Route | Auth |
//! |---|---|
//! | `GET /ws` | session token (`?token=` or bearer) |
//! | `POST /api/threads/{thread_id}/messages` | `Secret` header |
//! | `POST /api/portal/threads/{thread_id}/messages` | bearer session, must own thread |
//! | `GET /api/threads` | bearer session |
//! | `GET /api/threads/{thread_id}` | bearer session, must own thread |
//! | `GET /health` | none |

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State, WebSocketUpgrade, ws::rejection::WebSocketUpgradeRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use threadrelay_proto::{MAX_FRAME_SIZE, MessageRecord, ThreadId, UserId};

use crate::{
    env::Environment,
    ingest::{IngestError, MessageIngest, MessageOrigin},
    relay::Relay,
    storage::{Storage, StorageError, StoredThread},
    transport::{self, Heartbeat},
    webhook::{MessageWebhook, WebhookError},
};

/// Shared state for all handlers.
pub struct AppState<E, S: Storage> {
    /// Clock for connection heartbeats
    pub env: E,
    /// Relay handle, for WebSocket connections and health
    pub relay: Relay<S>,
    /// Session and thread lookups
    pub storage: S,
    /// Persist-then-publish bridge
    pub ingest: Arc<MessageIngest<E, S, Relay<S>>>,
    /// Shared secret for automation posts. `None` rejects every automation post
    pub incoming_secret: Option<Arc<str>>,
    /// Where user-sent messages are forwarded before being stored. `None`
    /// stores them directly
    pub webhook: Option<Arc<MessageWebhook>>,
    /// WebSocket ping cadence and eviction deadline
    pub heartbeat: Heartbeat,
}

impl<E: Environment, S: Storage> Clone for AppState<E, S> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            relay: self.relay.clone(),
            storage: self.storage.clone(),
            ingest: Arc::clone(&self.ingest),
            incoming_secret: self.incoming_secret.clone(),
            webhook: self.webhook.clone(),
            heartbeat: self.heartbeat,
        }
    }
}

/// Build the router.
pub fn router<E: Environment, S: Storage>(state: AppState<E, S>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::<E, S>))
        .route("/api/threads", get(list_threads::<E, S>))
        .route("/api/threads/{thread_id}", get(read_thread::<E, S>))
        .route("/api/threads/{thread_id}/messages", post(post_automation_message::<E, S>))
        .route("/api/portal/threads/{thread_id}/messages", post(post_user_message::<E, S>))
        .route("/health", get(health::<E, S>))
        .with_state(state)
}

/// HTTP-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Missing or invalid credentials
    #[error("Unauthorized")]
    Unauthorized,

    /// Unknown thread, or a thread the caller may not see
    #[error("Thread not found")]
    ThreadNotFound,

    /// Request body rejected
    #[error("{0}")]
    BadRequest(String),

    /// Storage collaborator failed
    #[error("storage unavailable")]
    Unavailable,

    /// Send-message webhook failed; nothing was stored
    #[error("failed to send message")]
    BadGateway,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ThreadNotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadGateway => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!("storage failure while serving request: {}", err);
        Self::Unavailable
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::ThreadNotFound(_) => Self::ThreadNotFound,
            IngestError::EmptyContent => Self::BadRequest(err.to_string()),
            IngestError::Storage(_) => Self::Unavailable,
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        tracing::warn!("send-message webhook failed: {}", err);
        Self::BadGateway
    }
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessage {
    message: String,
}

/// Response of the thread read path.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadView {
    /// Thread metadata
    pub thread: StoredThread,
    /// Messages in creation order
    pub messages: Vec<MessageRecord>,
}

/// GET /ws
async fn ws_handler<E: Environment, S: Storage>(
    State(state): State<AppState<E, S>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let token = query.token.as_deref().or_else(|| bearer_token(&headers));
    let user_id = authenticate(&state.storage, token)?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let AppState { relay, env, heartbeat, .. } = state;
    Ok(ws.max_message_size(MAX_FRAME_SIZE).on_upgrade(move |socket| {
        transport::run_connection(socket, relay, env, user_id, heartbeat)
    }))
}

/// POST /api/threads/{thread_id}/messages
async fn post_automation_message<E: Environment, S: Storage>(
    State(state): State<AppState<E, S>>,
    Path(raw_thread_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageRecord>, ApiError> {
    let provided = headers.get("Secret").and_then(|v| v.to_str().ok());
    if !secret_matches(state.incoming_secret.as_deref(), provided) {
        tracing::warn!("rejected automation post: bad secret");
        return Err(ApiError::Unauthorized);
    }

    let thread_id = parse_thread_id(raw_thread_id)?;
    let content = parse_body(&body)?;

    let record = state.ingest.ingest(&thread_id, &content, MessageOrigin::Automation).await?;
    Ok(Json(record))
}

/// POST /api/portal/threads/{thread_id}/messages
///
/// With a webhook configured the message is stored and published only after
/// the webhook accepts it.
async fn post_user_message<E: Environment, S: Storage>(
    State(state): State<AppState<E, S>>,
    Path(raw_thread_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageRecord>, ApiError> {
    let user_id = authenticate(&state.storage, bearer_token(&headers))?;
    let thread_id = parse_thread_id(raw_thread_id)?;
    let content = parse_body(&body)?;
    let origin = MessageOrigin::User(user_id);

    state.ingest.validate(&thread_id, &content, &origin)?;
    if let Some(webhook) = &state.webhook {
        webhook.forward(&thread_id, &content).await?;
    }

    let record = state.ingest.ingest(&thread_id, &content, origin).await?;
    Ok(Json(record))
}

/// GET /api/threads
async fn list_threads<E: Environment, S: Storage>(
    State(state): State<AppState<E, S>>,
    headers: HeaderMap,
) -> Result<Json<Vec<StoredThread>>, ApiError> {
    let user_id = authenticate(&state.storage, bearer_token(&headers))?;
    Ok(Json(state.storage.list_threads(&user_id)?))
}

/// GET /api/threads/{thread_id}
async fn read_thread<E: Environment, S: Storage>(
    State(state): State<AppState<E, S>>,
    Path(raw_thread_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ThreadView>, ApiError> {
    let user_id = authenticate(&state.storage, bearer_token(&headers))?;
    let thread_id = parse_thread_id(raw_thread_id)?;

    let thread = state
        .storage
        .find_thread(&thread_id)?
        .filter(|t| t.is_owned_by(&user_id))
        .ok_or(ApiError::ThreadNotFound)?;
    let messages = state.storage.load_messages(&thread_id)?;

    Ok(Json(ThreadView { thread, messages }))
}

/// GET /health
async fn health<E: Environment, S: Storage>(
    State(state): State<AppState<E, S>>,
) -> Json<serde_json::Value> {
    let connections = state.relay.connection_count().await;
    Json(serde_json::json!({ "status": "ok", "connections": connections }))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn authenticate<S: Storage>(storage: &S, token: Option<&str>) -> Result<UserId, ApiError> {
    let token = token.ok_or(ApiError::Unauthorized)?;
    storage.find_session(token)?.ok_or(ApiError::Unauthorized)
}

fn secret_matches(expected: Option<&str>, provided: Option<&str>) -> bool {
    let (Some(expected), Some(provided)) = (expected, provided) else {
        return false;
    };

    expected.len() == provided.len() && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}

/// Ids that could never name a room answer like an unknown thread.
fn parse_thread_id(raw: String) -> Result<ThreadId, ApiError> {
    ThreadId::parse(raw).map_err(|_| ApiError::ThreadNotFound)
}

fn parse_body(body: &[u8]) -> Result<String, ApiError> {
    serde_json::from_slice::<PostMessage>(body)
        .map(|p| p.message)
        .map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))
}
