use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use stemsplit_core::separation::SeparationEngine;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Model the separation engine is invoked with.
    pub engine_model: String,
    /// Whether the workspace upload directory is present.
    pub workspace_ready: bool,
    /// Largest accepted upload, in megabytes.
    pub max_upload_mb: usize,
}

/// GET /health -- returns service and workspace health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let lifecycle = state.session.lifecycle();
    let workspace_ready = tokio::fs::metadata(lifecycle.workspace().upload_root())
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    let status = if workspace_ready { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        engine_model: lifecycle.engine().model_name().to_string(),
        workspace_ready,
        max_upload_mb: state.config.max_upload_bytes / (1024 * 1024),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
