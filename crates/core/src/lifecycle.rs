//! Job lifecycle manager.
//!
//! Drives one [`Job`] through accept, process, package and cleanup against
//! a [`Workspace`] and a [`SeparationEngine`]. The manager holds no job
//! state of its own; callers own the `Job` value and pass it back in.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::archive;
use crate::error::CoreError;
use crate::job::{Job, JobFailure, JobStatus};
use crate::separation::{EngineError, SeparationEngine};
use crate::stems::{self, StemSet};
use crate::upload::{self, UploadedAsset};
use crate::workspace::{CleanupReport, Workspace};

/// Upper bound on same-second, same-name disambiguation suffixes.
const MAX_NAME_SUFFIX: u32 = 9_999;

/// Result of [`JobLifecycle::process`] for a job that was eligible to run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Succeeded { stems: StemSet },
    Failed { failure: JobFailure },
}

pub struct JobLifecycle<E> {
    workspace: Workspace,
    engine: E,
}

impl<E: SeparationEngine> JobLifecycle<E> {
    pub fn new(workspace: Workspace, engine: E) -> Self {
        Self { workspace, engine }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Prepare the workspace at startup. Any error here is fatal.
    pub async fn initialize_workspace(&self) -> Result<(), CoreError> {
        self.workspace.initialize().await
    }

    /// Store an upload under the upload root, stamped with its upload time.
    pub async fn accept(&self, asset: UploadedAsset) -> Result<Job, CoreError> {
        let at = asset.local_time();
        self.accept_at(asset, at).await
    }

    /// Store an upload using an explicit stamp.
    ///
    /// A name already present in the upload root is never overwritten: the
    /// next free `_1`, `_2`, ... suffix is used instead.
    pub async fn accept_at(&self, asset: UploadedAsset, at: NaiveDateTime) -> Result<Job, CoreError> {
        let root = self.workspace.upload_root();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| CoreError::io(root, e))?;

        let mut index = None;
        let (path, mut file) = loop {
            let name = upload::stored_filename(asset.original_filename(), at, index)?;
            let path = root.join(&name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let next = index.map_or(1, |i| i + 1);
                    if next > MAX_NAME_SUFFIX {
                        return Err(CoreError::Conflict(format!(
                            "Too many uploads named '{}' in the same second",
                            asset.original_filename()
                        )));
                    }
                    index = Some(next);
                }
                Err(e) => return Err(CoreError::io(&path, e)),
            }
        };

        file.write_all(asset.bytes())
            .await
            .map_err(|e| CoreError::io(&path, e))?;
        file.flush().await.map_err(|e| CoreError::io(&path, e))?;

        let job = Job::uploaded(
            asset.original_filename().to_string(),
            path,
            asset.size_bytes(),
            asset.uploaded_at(),
        );
        tracing::info!(
            job_id = %job.id,
            stored = %job.stored_filename,
            size_bytes = job.size_bytes,
            "File uploaded successfully",
        );
        Ok(job)
    }

    /// Run the separation engine for `job` and record the result on it.
    ///
    /// Returns `Err` only when the job is not in [`JobStatus::Uploaded`];
    /// every engine problem is reported as [`ProcessOutcome::Failed`]. No
    /// retry is attempted.
    pub async fn process(&self, job: &mut Job) -> Result<ProcessOutcome, CoreError> {
        self.process_observed(job, |_| {}).await
    }

    /// [`Self::process`], calling `on_started` right after the job enters
    /// [`JobStatus::Processing`] and before the engine is invoked.
    pub async fn process_observed<F>(&self, job: &mut Job, on_started: F) -> Result<ProcessOutcome, CoreError>
    where
        F: FnOnce(&Job) + Send,
    {
        job.start_processing()?;
        on_started(job);

        let result = self.run_engine(job).await;
        match result {
            Ok(stems) => {
                job.succeed(stems.dir.clone())?;
                tracing::info!(job_id = %job.id, stems = stems.files.len(), "Audio successfully split");
                Ok(ProcessOutcome::Succeeded { stems })
            }
            Err(failure) => {
                tracing::error!(job_id = %job.id, error = %failure, "Separation failed");
                job.fail(failure.clone())?;
                Ok(ProcessOutcome::Failed { failure })
            }
        }
    }

    async fn run_engine(&self, job: &Job) -> Result<StemSet, JobFailure> {
        let output_root = self.workspace.output_root();
        let output = self
            .engine
            .separate(&job.source_path, output_root)
            .await
            .map_err(|e| match e {
                EngineError::Timeout { elapsed_ms } => JobFailure::TimedOut { elapsed_ms },
                other => JobFailure::EngineUnavailable {
                    reason: other.to_string(),
                },
            })?;

        if !output.success() {
            return Err(JobFailure::engine_failed(
                Some(output.exit_code),
                &output.stderr,
            ));
        }

        let dir = stems::expected_dir(output_root, self.engine.model_name(), &job.source_base_name());
        let missing = || JobFailure::OutputMissing {
            expected: dir.display().to_string(),
        };

        let is_dir = tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            tracing::warn!(
                job_id = %job.id,
                expected = %dir.display(),
                "Engine reported success but stem directory is missing",
            );
            return Err(missing());
        }

        let stems = StemSet::load(&dir).await.map_err(|e| {
            tracing::warn!(job_id = %job.id, error = %e, "Stem directory unreadable");
            missing()
        })?;
        if stems.is_empty() {
            tracing::warn!(job_id = %job.id, dir = %dir.display(), "Stem directory is empty");
        }
        Ok(stems)
    }

    /// Zip the stems of a succeeded job into the workspace's fixed archive path.
    pub async fn package(&self, job: &mut Job) -> Result<PathBuf, CoreError> {
        let dir = match (job.status, &job.output_dir) {
            (JobStatus::Succeeded, Some(dir)) => dir.clone(),
            _ => {
                return Err(CoreError::Conflict(format!(
                    "Job {} cannot be packaged while {:?}",
                    job.id, job.status
                )))
            }
        };

        let archive_path = self.workspace.archive_path().to_path_buf();
        let written = match StemSet::load(&dir).await {
            Ok(stems) => archive::write_flat_archive(stems.files, &archive_path).await,
            Err(e) => Err(e),
        };

        match written {
            Ok(entries) => {
                job.set_archive(archive_path.clone())?;
                tracing::info!(
                    job_id = %job.id,
                    entries,
                    archive = %archive_path.display(),
                    "Stems packaged",
                );
                Ok(archive_path)
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Packaging failed");
                job.fail(JobFailure::PackagingFailed {
                    reason: packaging_reason(&e),
                })?;
                Err(e)
            }
        }
    }

    /// Remove every artifact in the workspace. Never fails; see [`CleanupReport`].
    pub async fn cleanup(&self) -> CleanupReport {
        self.workspace.cleanup().await
    }
}

/// User-facing summary of a packaging error, without paths.
fn packaging_reason(err: &CoreError) -> String {
    match err {
        CoreError::Io { source, .. } => source.kind().to_string(),
        _ => "archive could not be written".to_string(),
    }
}
