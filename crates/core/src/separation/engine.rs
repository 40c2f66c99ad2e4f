//! Engine trait and shared result types.

use std::future::Future;
use std::path::Path;

use serde::Serialize;

/// Captured result of one engine run that exited on its own.
#[derive(Debug, Clone, Serialize)]
pub struct EngineOutput {
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl EngineOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The engine could not be run to completion.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The program could not be spawned (usually: not installed).
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The configured timeout elapsed; the child was killed.
    #[error("engine timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("I/O error while waiting for engine: {0}")]
    Io(#[from] std::io::Error),
}

/// Implemented by anything that can split an audio file into stems.
///
/// On success the engine is expected to have created
/// `<output_root>/<model_name>/<input base name>/` with one file per stem.
pub trait SeparationEngine: Send + Sync {
    /// Model identifier; also the first directory level under the output root.
    fn model_name(&self) -> &str;

    /// Run a separation of `input` into `output_root`.
    ///
    /// Dropping the returned future must stop the underlying work.
    fn separate(
        &self,
        input: &Path,
        output_root: &Path,
    ) -> impl Future<Output = Result<EngineOutput, EngineError>> + Send;
}
