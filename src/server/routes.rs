//! HTTP route handlers for the assistant API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::ids::SessionId;
use crate::conversation::{DisplayMessage, FeedbackEntry};
use crate::pipeline::AssistantReply;
use crate::query::TabularResult;
use crate::schema::DatabaseContext;

use super::state::AppState;

type ApiError = (StatusCode, String);

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/{id}/messages",
            get(list_messages).delete(clear_messages),
        )
        .route("/api/sessions/{id}/chat", post(chat))
        .route("/api/sessions/{id}/feedback", post(submit_feedback))
        .route("/api/schema", get(schema_context))
        .with_state(state)
}

fn session_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("{e}")))
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "quadz-agent",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// New session response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Freshly generated session id.
    pub session_id: SessionId,
}

async fn create_session() -> Json<SessionResponse> {
    Json(SessionResponse {
        session_id: SessionId::generate(),
    })
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DisplayMessage>>, ApiError> {
    let id = session_id(&id)?;
    let _turn = state.lock_session(&id).await;
    Ok(Json(state.store(id).resolved_messages().await))
}

async fn clear_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = session_id(&id)?;
    let _turn = state.lock_session(&id).await;

    state
        .store(id)
        .clear()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Storage error: {e}")))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
}

/// Chat response: a sentence or a table.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// `text` or `table`.
    pub kind: String,
    /// The sentence, for text replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// The records, for table replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<TabularResult>,
}

impl From<AssistantReply> for ChatResponse {
    fn from(reply: AssistantReply) -> Self {
        match reply {
            AssistantReply::Text(text) => Self {
                kind: "text".to_string(),
                text: Some(text),
                table: None,
            },
            AssistantReply::Table(table) => Self {
                kind: "table".to_string(),
                text: None,
                table: Some(table),
            },
        }
    }
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let id = session_id(&id)?;
    let message = request.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is empty".to_string()));
    }

    let _turn = state.lock_session(&id).await;
    let store = state.store(id);
    let reply = state.pipeline.respond(&store, message).await;
    Ok(Json(reply.into()))
}

/// Feedback request.
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    /// Key identifying the rated message.
    pub feedback_key: String,
    /// The rated message: a string, or a table as returned by `/chat`.
    pub ai_message: Value,
    /// Rating payload.
    pub user_feedback: Value,
}

fn message_text(message: Value) -> String {
    match message {
        Value::String(text) => text,
        other => serde_json::from_value::<TabularResult>(other.clone())
            .map_or_else(|_| other.to_string(), |table| table.to_text()),
    }
}

async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<FeedbackRequest>,
) -> Result<StatusCode, ApiError> {
    let entry = FeedbackEntry {
        session_id: session_id(&id)?,
        feedback_key: request.feedback_key,
        ai_message: message_text(request.ai_message),
        user_feedback: request.user_feedback,
    };
    state
        .feedback
        .submit(entry)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Storage error: {e}")))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn schema_context(State(state): State<Arc<AppState>>) -> Result<Json<DatabaseContext>, ApiError> {
    let source = state.pipeline.schema().ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            "database lookups are delegated".to_string(),
        )
    })?;
    Ok(Json(source.context().await))
}
