//! REST API surface
//!
//! Thin JSON glue over the dispatcher and the session lifecycle service.
//! Every route maps 1:1 onto a core operation; no business logic lives here.
//!
//! # Endpoints
//!
//! - POST /api/sessions - Create a session
//! - GET /api/sessions/user/:user_id - List a user's sessions
//! - GET /api/sessions/:id/history - Full typed message history
//! - PATCH /api/sessions/:id - Rename a session
//! - DELETE /api/sessions/:id - Delete a session (cascades)
//! - POST /api/chat - Dispatch one chat turn
//! - POST /api/chat/edit_and_resubmit - Rewind the last pair and re-answer

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sdk::errors::{CoreError, KotobaErrorExt};
use sdk::types::Turn;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::dispatcher::{DispatchError, DispatchOutcome, DispatchRequest, Dispatcher};

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/user/:user_id", get(list_sessions_handler))
        .route("/api/sessions/:id/history", get(history_handler))
        .route(
            "/api/sessions/:id",
            axum::routing::patch(rename_session_handler).delete(delete_session_handler),
        )
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/edit_and_resubmit", post(edit_and_resubmit_handler))
        .with_state(state)
}

/// Serve the API until ctrl-c.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

/// Error wrapper mapping the core taxonomy onto HTTP statuses.
///
/// NotFound → 404, InsufficientHistory → 409 (a refusal, not logged as an
/// error), everything else → 500 with the detail kept in the logs.
struct ApiError(DispatchError);

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        Self(e)
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(DispatchError::Core(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            DispatchError::Core(e @ CoreError::NotFound(what)) => {
                (StatusCode::NOT_FOUND, format!("{}: {what}", e.user_hint()))
            }
            DispatchError::Core(e @ CoreError::InsufficientHistory) => {
                (StatusCode::CONFLICT, e.user_hint().to_string())
            }
            DispatchError::Core(e) => {
                error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.user_hint().to_string())
            }
            DispatchError::Agent(detail) => {
                error!(error = detail, "Agent failed to produce a reply");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The assistant could not answer. Please try again".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn rfc3339(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

// --- Session management ---

#[derive(Debug, Deserialize)]
pub struct SessionCreateRequest {
    pub user_id: String,
    pub session_name: String,
    #[serde(default = "default_session_type")]
    pub session_type: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
}

fn default_session_type() -> String {
    "GENERAL".to_string()
}

#[derive(Debug, Serialize)]
struct SessionCreateResponse {
    session_id: i64,
}

async fn create_session_handler(
    State(state): State<AppState>,
    Json(req): Json<SessionCreateRequest>,
) -> Result<Json<SessionCreateResponse>, ApiError> {
    let session_id = state
        .dispatcher
        .sessions()
        .create_session(
            &req.user_id,
            &req.session_name,
            &req.session_type,
            req.context.as_ref(),
        )
        .await?;

    Ok(Json(SessionCreateResponse { session_id }))
}

#[derive(Debug, Serialize)]
struct SessionInfo {
    id: i64,
    name: String,
    updated_at: String,
}

#[derive(Debug, Serialize)]
struct SessionListResponse {
    user_id: String,
    sessions: Vec<SessionInfo>,
}

async fn list_sessions_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<SessionListResponse> {
    let sessions = state
        .dispatcher
        .sessions()
        .list_sessions(&user_id)
        .await
        .into_iter()
        .map(|s| SessionInfo {
            id: s.id,
            name: s.name,
            updated_at: rfc3339(s.updated_at),
        })
        .collect();

    Json(SessionListResponse { user_id, sessions })
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    session_id: i64,
    messages: Vec<Turn>,
}

async fn history_handler(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let data = state
        .dispatcher
        .sessions()
        .load_session(session_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("session {session_id}")))?;

    Ok(Json(HistoryResponse {
        session_id,
        messages: data.history,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SessionRenameRequest {
    pub new_name: String,
}

async fn rename_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
    Json(req): Json<SessionRenameRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let renamed = state
        .dispatcher
        .sessions()
        .rename_session(session_id, &req.new_name)
        .await?;

    if !renamed {
        return Err(CoreError::NotFound(format!("session {session_id}")).into());
    }

    Ok(Json(json!({ "success": true })))
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.dispatcher.sessions().delete_session(session_id).await?;

    if !deleted {
        return Err(CoreError::NotFound(format!("session {session_id}")).into());
    }

    Ok(Json(json!({ "success": true })))
}

// --- Chat dispatch ---

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<i64>,
    pub user_input: String,
    #[serde(default)]
    pub redirect_to: Option<String>,
    #[serde(default)]
    pub original_question: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: i64,
    pub ai_response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_question: Option<String>,
}

impl From<DispatchOutcome> for ChatResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Answer { session_id, output } => Self {
                session_id,
                ai_response: output,
                redirect_to: None,
                original_question: None,
            },
            DispatchOutcome::RedirectProposal {
                session_id,
                notice,
                redirect_to,
                original_question,
            } => Self {
                session_id,
                ai_response: notice,
                redirect_to: Some(redirect_to),
                original_question: Some(original_question),
            },
            DispatchOutcome::Unsupported { session_id, reply } => Self {
                session_id,
                ai_response: reply,
                redirect_to: None,
                original_question: None,
            },
        }
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = state
        .dispatcher
        .dispatch(DispatchRequest {
            user_id: req.user_id,
            session_id: req.session_id,
            user_input: req.user_input,
            redirect_to: req.redirect_to,
            original_question: req.original_question,
        })
        .await?;

    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize)]
pub struct ChatEditRequest {
    pub session_id: i64,
    pub corrected_input: String,
}

async fn edit_and_resubmit_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatEditRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = state
        .dispatcher
        .resubmit(req.session_id, &req.corrected_input)
        .await?;

    Ok(Json(outcome.into()))
}
