use std::time::Duration;

use stemsplit_core::separation::command::{DEFAULT_MODEL, DEFAULT_PREFIX_ARGS, DEFAULT_PROGRAM};
use stemsplit_core::separation::CommandEngine;
use stemsplit_core::workspace::{
    Workspace, DEFAULT_ARCHIVE_PATH, DEFAULT_OUTPUT_DIR, DEFAULT_UPLOAD_DIR,
};

/// Filename offered to the browser for the stem archive.
pub const DOWNLOAD_FILENAME: &str = "split_audio_tracks.zip";

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `300`). Separation runs in
    /// the background, so this only bounds uploads and downloads.
    pub request_timeout_secs: u64,
    /// How long shutdown waits for a cancelled job to wind down (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub upload_dir: String,
    pub output_dir: String,
    pub archive_path: String,
    /// Separation engine executable (default: `python3`).
    pub engine_program: String,
    /// Arguments placed before `-n <model>` (default: `-m demucs`).
    pub engine_args: Vec<String>,
    /// Model identifier passed as `-n` (default: `htdemucs`).
    pub engine_model: String,
    /// Kill the engine after this many seconds; `None` waits forever.
    pub engine_timeout_secs: Option<u64>,
    /// Largest accepted upload in bytes (default: 200 MiB).
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `300`                      |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `UPLOAD_DIR`           | `upload_audio`             |
    /// | `OUTPUT_DIR`           | `split_my_audio`           |
    /// | `ARCHIVE_PATH`         | `split_audio_output.zip`   |
    /// | `ENGINE_PROGRAM`       | `python3`                  |
    /// | `ENGINE_ARGS`          | `-m demucs`                |
    /// | `ENGINE_MODEL`         | `htdemucs`                 |
    /// | `ENGINE_TIMEOUT_SECS`  | unset (no timeout)         |
    /// | `MAX_UPLOAD_MB`        | `200`                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| DEFAULT_UPLOAD_DIR.into());
        let output_dir = std::env::var("OUTPUT_DIR").unwrap_or_else(|_| DEFAULT_OUTPUT_DIR.into());
        let archive_path =
            std::env::var("ARCHIVE_PATH").unwrap_or_else(|_| DEFAULT_ARCHIVE_PATH.into());

        let engine_program =
            std::env::var("ENGINE_PROGRAM").unwrap_or_else(|_| DEFAULT_PROGRAM.into());

        let engine_args: Vec<String> = match std::env::var("ENGINE_ARGS") {
            Ok(raw) => raw.split_whitespace().map(str::to_string).collect(),
            Err(_) => DEFAULT_PREFIX_ARGS.iter().map(|s| s.to_string()).collect(),
        };

        let engine_model = std::env::var("ENGINE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());

        let engine_timeout_secs: Option<u64> = std::env::var("ENGINE_TIMEOUT_SECS")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse()
                    .expect("ENGINE_TIMEOUT_SECS must be a valid u64")
            });

        let max_upload_mb: usize = std::env::var("MAX_UPLOAD_MB")
            .unwrap_or_else(|_| "200".into())
            .parse()
            .expect("MAX_UPLOAD_MB must be a valid usize");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            upload_dir,
            output_dir,
            archive_path,
            engine_program,
            engine_args,
            engine_model,
            engine_timeout_secs,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        }
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.upload_dir, &self.output_dir, &self.archive_path)
    }

    pub fn engine(&self) -> CommandEngine {
        CommandEngine::new(
            self.engine_program.clone(),
            self.engine_args.clone(),
            self.engine_model.clone(),
        )
        .with_timeout(self.engine_timeout_secs.map(Duration::from_secs))
    }
}
