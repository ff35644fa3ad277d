//! Conflict ledger routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use quotesync_engine::{ConflictEntry, Record, Seq};
use serde::Serialize;

use crate::error::Result;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    /// `None` when a quote with the same content already exists
    pub restored: Option<Record>,
}

/// Create conflict routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/conflicts", get(list_conflicts))
        .route("/conflicts/{seq}/restore", post(restore_conflict))
}

/// GET /conflicts - Every recorded conflict, oldest first.
async fn list_conflicts(State(state): State<AppState>) -> Json<Vec<ConflictEntry>> {
    Json(state.engine.conflicts().await)
}

/// POST /conflicts/{seq}/restore - Re-add the overridden local version.
async fn restore_conflict(
    State(state): State<AppState>,
    Path(seq): Path<Seq>,
) -> Result<Json<RestoreResponse>> {
    let restored = state.engine.restore_conflict(seq).await?;
    Ok(Json(RestoreResponse { restored }))
}
