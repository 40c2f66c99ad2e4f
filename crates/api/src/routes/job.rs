//! Route definitions for the single-job workflow.
//!
//! Mounted at `/api/v1/job` by `api_routes()`.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::job;
use crate::state::AppState;

/// Job routes.
///
/// ```text
/// GET    /                  -> get_job
/// POST   /upload            -> upload_file
/// POST   /process           -> process_job
/// POST   /cancel            -> cancel_job
/// GET    /source            -> get_source
/// GET    /download          -> download_archive
/// ```
///
/// Only the upload route accepts bodies up to `max_upload_bytes`.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(job::get_job))
        .route(
            "/upload",
            post(job::upload_file).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/process", post(job::process_job))
        .route("/cancel", post(job::cancel_job))
        .route("/source", get(job::get_source))
        .route("/download", get(job::download_archive))
}
