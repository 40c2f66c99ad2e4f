use std::sync::Arc;

use crate::config::ServerConfig;
use crate::session::Session;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The single-job session owning the workspace.
    pub session: Arc<Session>,
}
