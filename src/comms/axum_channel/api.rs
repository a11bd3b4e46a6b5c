//! Axum handlers for `/api/*` routes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::session::ChatMessage;

use super::AxumState;

#[derive(Deserialize)]
pub(super) struct MessageRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ChatReply {
    session_id: Option<String>,
    message: ChatMessage,
}

fn json_error(status: StatusCode, code: &str, msg: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": code, "message": format!("{msg}") }))).into_response()
}

/// GET /api/health
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    Json(json!({ "status": "ok", "backend": state.comms.backend_url() })).into_response()
}

/// POST /api/session — chat start.
pub(super) async fn start_session(State(state): State<AxumState>) -> Response {
    let (session_id, message) = state.comms.open_session(&state.channel_id);
    info!(channel_id = %state.channel_id, %session_id, "chat session opened");
    Json(ChatReply { session_id: Some(session_id), message }).into_response()
}

/// DELETE /api/session/{session_id}
pub(super) async fn end_session(
    State(state): State<AxumState>,
    Path(session_id): Path<String>,
) -> Response {
    if state.comms.close_session(&session_id) {
        info!(channel_id = %state.channel_id, %session_id, "chat session closed");
        StatusCode::NO_CONTENT.into_response()
    } else {
        json_error(StatusCode::NOT_FOUND, "unknown_session", format!("no session {session_id}"))
    }
}

/// POST /api/message
///
/// Backend failures still answer 200 with an `error`-kind message: the
/// exchange completed, it just produced an error for the user to see.
pub(super) async fn message(
    State(state): State<AxumState>,
    Json(req): Json<MessageRequest>,
) -> Response {
    let text = req.message.trim();
    if text.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "empty_message", "message must not be empty");
    }

    let session_id = req.session_id.filter(|s| !s.is_empty());
    let cancel = match session_id.as_deref() {
        Some(id) => match state.comms.session_token(id) {
            Some(token) => token,
            None => {
                return json_error(StatusCode::NOT_FOUND, "unknown_session", format!("no session {id}"));
            }
        },
        None => state.comms.exchange_token(),
    };

    debug!(channel_id = %state.channel_id, session_id = ?session_id, "message received");
    let message = state.comms.send_message(text, &cancel).await;

    Json(ChatReply { session_id, message }).into_response()
}
