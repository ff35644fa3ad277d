//! Sync control routes.

use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::scheduler::{AutoSyncStatus, SyncReport};
use crate::AppState;

/// Response of `GET /sync/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub running: bool,
    pub auto_sync: AutoSyncStatus,
    pub last_sync: Option<SyncReport>,
}

/// Body of `PUT /sync/auto`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSyncRequest {
    pub enabled: bool,
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub was_running: bool,
}

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync", post(trigger_sync))
        .route("/sync/cancel", post(cancel_sync))
        .route("/sync/status", get(sync_status))
        .route("/sync/auto", put(set_auto_sync))
}

/// POST /sync - Run a round and return its report.
async fn trigger_sync(State(state): State<AppState>) -> Result<Json<SyncReport>> {
    // Spawned so the round finishes even if the client hangs up.
    let scheduler = state.scheduler.clone();
    let report = tokio::spawn(async move { scheduler.trigger_manual_sync().await })
        .await
        .map_err(|e| AppError::Internal(format!("sync task failed: {}", e)))??;
    Ok(Json(report))
}

/// POST /sync/cancel - Cancel the round in flight.
async fn cancel_sync(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        was_running: state.scheduler.cancel_current_round(),
    })
}

/// GET /sync/status - Scheduler state and the last report.
async fn sync_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(SyncStatus {
        running: state.scheduler.is_running(),
        auto_sync: state.scheduler.auto_sync_status(),
        last_sync: state.engine.last_sync().await,
    })
}

/// PUT /sync/auto - Enable or disable periodic sync.
async fn set_auto_sync(
    State(state): State<AppState>,
    Json(request): Json<AutoSyncRequest>,
) -> Result<Json<AutoSyncStatus>> {
    if request.interval_secs == Some(0) {
        return Err(AppError::BadRequest(
            "intervalSecs must be positive".to_string(),
        ));
    }
    let interval = request.interval_secs.map(Duration::from_secs);
    Ok(Json(state.scheduler.set_auto_sync(request.enabled, interval)))
}
