//! HTTP request handlers

use super::types::{
    DeleteResponse, EditMessageRequest, ErrorResponse, SendMessageRequest, SuccessResponse,
};
use super::AppState;
use crate::bot::{Command, IncomingMessage, Reply};
use crate::session::MessageId;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Inbound chat events
        .route("/api/users/:user_id/messages", post(send_message))
        .route("/api/users/:user_id/reply", post(retry_reply))
        .route(
            "/api/messages/:message_id",
            put(edit_message).delete(delete_message),
        )
        // Named commands
        .route("/api/users/:user_id/commands", post(run_command))
        // Persona documents
        .route(
            "/api/users/:user_id/persona",
            get(export_persona).put(import_persona),
        )
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Chat Events
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    let incoming = IncomingMessage {
        text: req.text,
        reply_to_bot: req.reply_to_bot,
        mentions_bot: req.mentions_bot,
    };
    match state.bot.on_message(&user_id, &incoming).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn retry_reply(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Reply> {
    Json(state.bot.on_retry(&user_id).await)
}

async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<Reply>, AppError> {
    state
        .bot
        .on_edit(message_id, &req.text)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Message {message_id} not found")))
}

async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
) -> Result<Json<DeleteResponse>, AppError> {
    if state.bot.on_delete(message_id).await {
        Ok(Json(DeleteResponse { deleted: true }))
    } else {
        Err(AppError::NotFound(format!("Message {message_id} not found")))
    }
}

// ============================================================
// Commands
// ============================================================

async fn run_command(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    command: Result<Json<Command>, JsonRejection>,
) -> Result<Json<Reply>, AppError> {
    let Json(command) = command.map_err(|e| AppError::BadRequest(e.body_text()))?;
    Ok(Json(state.bot.on_command(&user_id, command).await))
}

// ============================================================
// Persona Export / Import
// ============================================================

async fn export_persona(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response, AppError> {
    let document = state
        .bot
        .chat()
        .personas()
        .export(&user_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], document).into_response())
}

async fn import_persona(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: String,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .bot
        .chat()
        .personas()
        .import(&user_id, &body)
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    tracing::info!(user_id = %user_id, "Imported persona");
    Ok(Json(SuccessResponse { success: true }))
}

async fn get_version() -> &'static str {
    concat!("persona-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
