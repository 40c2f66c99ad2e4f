//! Job state machine.
//!
//! ```text
//! Uploaded -> Processing -> Succeeded
//!                        -> Failed
//! ```
//!
//! There is no transition back to `Uploaded`; a new upload always creates
//! a new [`Job`].

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Placeholder shown when the engine fails without writing to stderr.
pub const NO_ERROR_MESSAGE: &str = "No error message returned.";

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Succeeded,
    Failed,
}

/// Why a job ended in [`JobStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    /// The engine exited non-zero. `diagnostic` is its stderr, verbatim.
    #[error("Demucs splitting failed: {diagnostic}")]
    EngineFailed {
        exit_code: Option<i32>,
        diagnostic: String,
    },

    /// The engine reported success but the expected stem directory is absent.
    #[error("Couldn't locate split stems at {expected}")]
    OutputMissing { expected: String },

    /// The engine could not be started at all.
    #[error("Separation engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    #[error("Separation timed out after {elapsed_ms}ms")]
    TimedOut { elapsed_ms: u64 },

    #[error("Separation cancelled")]
    Cancelled,

    /// Separation succeeded but the stems could not be zipped. `reason`
    /// names the kind of failure only, never a filesystem path.
    #[error("Couldn't package split stems: {reason}")]
    PackagingFailed { reason: String },
}

impl JobFailure {
    /// Build an [`JobFailure::EngineFailed`], substituting the placeholder for empty stderr.
    pub fn engine_failed(exit_code: Option<i32>, stderr: &str) -> Self {
        let diagnostic = if stderr.trim().is_empty() {
            NO_ERROR_MESSAGE.to_string()
        } else {
            stderr.to_string()
        };
        Self::EngineFailed {
            exit_code,
            diagnostic,
        }
    }
}

/// One upload-to-cleanup run.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    /// Stored filename without extension (`{stamp}_{base}`); unique per upload.
    pub id: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub source_path: PathBuf,
    pub size_bytes: u64,
    pub uploaded_at: Timestamp,
    pub status: JobStatus,
    /// Directory the stems are expected in; set once processing has finished.
    pub output_dir: Option<PathBuf>,
    /// Present only after successful packaging.
    pub archive_path: Option<PathBuf>,
    pub failure: Option<JobFailure>,
}

impl Job {
    /// A freshly accepted job in [`JobStatus::Uploaded`].
    pub fn uploaded(
        original_filename: String,
        source_path: PathBuf,
        size_bytes: u64,
        uploaded_at: Timestamp,
    ) -> Self {
        let stored_filename = file_name_of(&source_path);
        let id = source_base_name(&source_path);
        Self {
            id,
            original_filename,
            stored_filename,
            source_path,
            size_bytes,
            uploaded_at,
            status: JobStatus::Uploaded,
            output_dir: None,
            archive_path: None,
            failure: None,
        }
    }

    /// Base name of the stored source file, as the engine sees it.
    pub fn source_base_name(&self) -> String {
        source_base_name(&self.source_path)
    }

    /// Upload size in megabytes (MiB), for display.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// The user-facing diagnostic, if the job failed.
    pub fn diagnostic(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    pub fn start_processing(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Uploaded, JobStatus::Processing)
    }

    pub fn succeed(&mut self, output_dir: PathBuf) -> Result<(), CoreError> {
        self.transition(JobStatus::Processing, JobStatus::Succeeded)?;
        self.output_dir = Some(output_dir);
        Ok(())
    }

    /// Move to [`JobStatus::Failed`].
    ///
    /// Allowed from `Processing`, and from `Succeeded` only for
    /// [`JobFailure::PackagingFailed`]. Any archive reference is dropped.
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), CoreError> {
        let from = match (&failure, self.status) {
            (JobFailure::PackagingFailed { .. }, JobStatus::Succeeded) => JobStatus::Succeeded,
            _ => JobStatus::Processing,
        };
        self.transition(from, JobStatus::Failed)?;
        self.archive_path = None;
        self.failure = Some(failure);
        Ok(())
    }

    pub fn set_archive(&mut self, archive_path: PathBuf) -> Result<(), CoreError> {
        if self.status != JobStatus::Succeeded {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot be packaged while {:?}",
                self.id, self.status
            )));
        }
        self.archive_path = Some(archive_path);
        Ok(())
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), CoreError> {
        if self.status != from {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {:?} to {:?}",
                self.id, self.status, to
            )));
        }
        tracing::debug!(job_id = %self.id, ?from, ?to, "Job transition");
        self.status = to;
        Ok(())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn source_base_name(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
