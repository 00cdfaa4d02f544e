use super::state::AppState;
use crate::error::RecorderError;
use crate::session::{ControllerStatus, SessionReport};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    /// Meeting record the session belongs to
    pub meeting_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub meeting_id: String,
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub status: String,
    pub report: SessionReport,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(err: RecorderError) -> Response {
    let status = match err {
        RecorderError::AlreadyRecording | RecorderError::NotRecording => StatusCode::CONFLICT,
        RecorderError::InvalidMeetingId(_) => StatusCode::BAD_REQUEST,
        RecorderError::StreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recordings/start
/// Start a new recording session
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> Response {
    info!("Starting recording for meeting: {}", req.meeting_id);

    match state.controller.start(&req.meeting_id).await {
        Ok(session_id) => (
            StatusCode::OK,
            Json(StartRecordingResponse {
                meeting_id: req.meeting_id,
                session_id,
                status: "recording".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start recording: {}", e);
            error_response(e)
        }
    }
}

/// POST /recordings/stop
/// Stop the active session; responds once every segment is stored or failed
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    info!("Stopping recording");

    match state.controller.stop().await {
        Ok(report) => {
            let status = if report.is_success() { "done" } else { "error" };
            (
                StatusCode::OK,
                Json(StopRecordingResponse {
                    status: status.to_string(),
                    report,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            error_response(e)
        }
    }
}

/// GET /recordings/status
pub async fn get_status(State(state): State<AppState>) -> Json<ControllerStatus> {
    Json(state.controller.status().await)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
