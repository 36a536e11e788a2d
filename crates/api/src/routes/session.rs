//! Session control routes

use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

use crate::{ApiError, AppState, ControlResponse};

/// Start a focus session
pub async fn start_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ControlResponse>, ApiError> {
    let report = state.worker.start().await?;
    info!(session = %report.session_id, "Session started via API");

    Ok(Json(ControlResponse {
        session_id: Some(report.session_id),
        ..ControlResponse::success("Focus session started.")
    }))
}

/// Stop the running focus session
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ControlResponse>, ApiError> {
    state.worker.stop().await?;
    Ok(Json(ControlResponse::success("Focus session stopped.")))
}
