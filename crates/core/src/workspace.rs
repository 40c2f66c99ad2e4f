//! On-disk workspace owned by one lifecycle manager.
//!
//! Two roots plus one fixed archive path. None of it survives a restart:
//! the upload root is force-cleared on [`Workspace::initialize`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::CoreError;

/// Default upload root, relative to the working directory.
pub const DEFAULT_UPLOAD_DIR: &str = "upload_audio";
/// Default output root handed to the separation engine.
pub const DEFAULT_OUTPUT_DIR: &str = "split_my_audio";
/// Default fixed archive path.
pub const DEFAULT_ARCHIVE_PATH: &str = "split_audio_output.zip";

/// Paths exclusively owned by one session.
#[derive(Debug, Clone)]
pub struct Workspace {
    upload_root: PathBuf,
    output_root: PathBuf,
    archive_path: PathBuf,
}

/// Outcome of [`Workspace::cleanup`]. Problems are warnings, never errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub warnings: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(DEFAULT_UPLOAD_DIR, DEFAULT_OUTPUT_DIR, DEFAULT_ARCHIVE_PATH)
    }
}

impl Workspace {
    pub fn new(
        upload_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        archive_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            upload_root: upload_root.into(),
            output_root: output_root.into(),
            archive_path: archive_path.into(),
        }
    }

    /// All three paths nested under `base`, using the default names.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self::new(
            base.join(DEFAULT_UPLOAD_DIR),
            base.join(DEFAULT_OUTPUT_DIR),
            base.join(DEFAULT_ARCHIVE_PATH),
        )
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Clear the upload root and make sure the output root exists.
    ///
    /// Prior outputs are left in place. Safe to call repeatedly.
    pub async fn initialize(&self) -> Result<(), CoreError> {
        clear_dir(&self.upload_root).await?;
        tokio::fs::create_dir_all(&self.output_root)
            .await
            .map_err(|e| CoreError::io(&self.output_root, e))?;

        tracing::info!(
            upload_root = %self.upload_root.display(),
            output_root = %self.output_root.display(),
            "Workspace initialized",
        );
        Ok(())
    }

    /// Remove everything a job left behind.
    ///
    /// Both roots are recreated empty and the archive is deleted. Each step
    /// runs even if an earlier one failed.
    pub async fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for root in [&self.upload_root, &self.output_root] {
            if let Err(e) = clear_dir(root).await {
                tracing::warn!(error = %e, "Cleanup could not clear directory");
                report.warnings.push(e.to_string());
            }
        }

        match tokio::fs::remove_file(&self.archive_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                let err = CoreError::io(&self.archive_path, e);
                tracing::warn!(error = %err, "Cleanup could not remove archive");
                report.warnings.push(err.to_string());
            }
        }

        if report.is_clean() {
            tracing::info!("Cleanup completed. All files removed.");
        }
        report
    }
}

/// Remove `dir` (if present) and recreate it empty.
async fn clear_dir(dir: &Path) -> Result<(), CoreError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(CoreError::io(dir, e)),
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CoreError::io(dir, e))
}

/// True when `dir` exists and has no entries.
pub async fn is_empty_dir(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}
