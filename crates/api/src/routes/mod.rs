pub mod health;
pub mod job;

use axum::routing::get;
use axum::Router;

use crate::config::ServerConfig;
use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /job                                             current job snapshot
/// /job/upload                                      multipart upload (POST)
/// /job/process                                     start separation (POST)
/// /job/cancel                                      cancel separation (POST)
/// /job/source                                      uploaded audio
/// /job/download                                    stem archive, then cleanup
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new().nest("/job", job::router(config.max_upload_bytes))
}

/// Routes served outside `/api/v1`.
pub fn ui_routes() -> Router<AppState> {
    Router::new().route("/", get(handlers::ui::index))
}
