//! HTTP request handlers

use super::types::{
    CompleteJobRequest, ErrorResponse, LogResponse, MessagesResponse, NotificationRequest,
};
use super::AppState;
use crate::notifier::{JobCompletion, NotifyError, NotifyReport};
use crate::record_log::LogRecord;
use crate::transport::Activity;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Inbound channel activities
        .route("/api/messages", post(post_message))
        // External triggers
        .route("/api/notifications", post(post_notification))
        .route("/api/jobs/:id/complete", post(complete_job))
        // Log listings
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:id", get(get_job))
        .route("/api/channels", get(list_channels))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Turns
// ============================================================

async fn post_message(
    State(state): State<AppState>,
    Json(activity): Json<Activity>,
) -> Result<Json<MessagesResponse>, AppError> {
    let replies = state
        .bot
        .on_turn(activity)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(MessagesResponse { replies }))
}

// ============================================================
// Proactive notifications
// ============================================================

async fn post_notification(
    State(state): State<AppState>,
    Json(req): Json<NotificationRequest>,
) -> Result<Json<NotifyReport>, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".to_string()));
    }
    let report = state.notifier.notify_all(message).await?;
    Ok(Json(report))
}

async fn complete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CompleteJobRequest>>,
) -> Result<Json<JobCompletion>, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let completion = state
        .notifier
        .complete_job(&id, req.detail.as_deref())
        .await?;
    Ok(Json(completion))
}

// ============================================================
// Listings
// ============================================================

async fn list_jobs(State(state): State<AppState>) -> Result<Json<LogResponse>, AppError> {
    let records = state
        .bot
        .jobs()
        .records()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(LogResponse { records }))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LogRecord>, AppError> {
    let record = state
        .bot
        .jobs()
        .find(&id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("Job not found: {id}")))?;
    Ok(Json(record))
}

async fn list_channels(State(state): State<AppState>) -> Result<Json<LogResponse>, AppError> {
    let records = state
        .bot
        .channels()
        .records()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(LogResponse { records }))
}

async fn get_version() -> &'static str {
    concat!("niles-bot ", env!("CARGO_PKG_VERSION"))
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

impl From<NotifyError> for AppError {
    fn from(e: NotifyError) -> Self {
        match e {
            NotifyError::UnknownJob(_) => AppError::NotFound(e.to_string()),
            NotifyError::State(_) => AppError::Internal(e.to_string()),
        }
    }
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
