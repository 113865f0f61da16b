use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use super::lookup_error;
use crate::api::response::{ApiError, JSend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_size: u64,
    pub total_uploads: u64,
    pub unique_files: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<StatsResponse>>, ApiError> {
    let stats = state
        .uploader
        .stats()
        .map_err(|e| lookup_error(e, state.config.production))?;

    Ok(JSend::success(StatsResponse {
        total_size: stats.total_size,
        total_uploads: stats.total_uploads,
        unique_files: stats.unique_files,
    }))
}
