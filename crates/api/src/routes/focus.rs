//! Focus polling route

use axum::{extract::State, Json};
use std::sync::Arc;
use storage::Snapshot;
use tracing::warn;

use crate::AppState;

/// Latest focus snapshot
///
/// Served from memory once this process has published anything, otherwise
/// from the mirrored file, otherwise the zeroed default.
pub async fn get_focus_data(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    if state.worker.has_published() {
        return Json(state.worker.latest_snapshot());
    }

    let file = state.worker.snapshot_file().clone();
    let snapshot = tokio::task::spawn_blocking(move || file.read_or_default())
        .await
        .unwrap_or_else(|e| {
            warn!("Snapshot read task failed: {}", e);
            Snapshot::default()
        });
    Json(snapshot)
}
