use super::state::AppState;
use crate::history::HistoryEntry;
use crate::session::{SessionStats, SessionStatus};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ClearHistoryParams {
    /// Clearing history is destructive and must be confirmed explicitly
    pub confirm: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub status: SessionStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /session/status
pub async fn get_session_status(State(state): State<AppState>) -> Json<SessionStats> {
    Json(state.session.stats().await)
}

/// POST /session/toggle
/// Start the session, or stop it when connected
pub async fn toggle_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.toggle().await {
        Ok(()) => {
            let status = state.session.status();
            info!("Session toggled: {}", status);
            (
                StatusCode::OK,
                Json(ToggleResponse {
                    status,
                    message: format!("Session {}", status),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start session: {:#}", e);
            error_response(
                StatusCode::BAD_GATEWAY,
                format!("Failed to start session: {:#}", e),
            )
        }
    }
}

/// GET /history
pub async fn list_history(State(state): State<AppState>) -> impl IntoResponse {
    match state.history.list() {
        Ok(entries) => (StatusCode::OK, Json(HistoryResponse { entries })).into_response(),
        Err(e) => {
            error!("Failed to read history: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read history: {}", e),
            )
        }
    }
}

/// DELETE /history?confirm=true
pub async fn clear_history(
    State(state): State<AppState>,
    Query(params): Query<ClearHistoryParams>,
) -> impl IntoResponse {
    if params.confirm != Some(true) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Clearing history requires confirm=true".to_string(),
        );
    }

    match state.history.clear() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Failed to clear history: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to clear history: {}", e),
            )
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
