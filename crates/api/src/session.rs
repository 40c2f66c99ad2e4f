//! The single-job session behind the HTTP surface.
//!
//! The service works on one upload at a time. [`Session`] owns that slot and
//! enforces the transitions between "nothing uploaded", "uploaded, waiting
//! for the user to press split" and "handed to the background runner".

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stemsplit_core::error::CoreError;
use stemsplit_core::lifecycle::JobLifecycle;
use stemsplit_core::separation::CommandEngine;
use stemsplit_core::upload::UploadedAsset;
use stemsplit_core::workspace::CleanupReport;
use tokio::sync::Mutex;

use crate::engine::runner::{self, JobHandle, JobSnapshot, UPLOADED_MESSAGE};

/// Lifecycle wired to the configured engine command.
pub type Lifecycle = JobLifecycle<CommandEngine>;

enum Slot {
    Empty,
    Uploaded(stemsplit_core::job::Job),
    Running(JobHandle),
}

/// Source audio of the current job.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub original_filename: String,
}

/// A downloaded archive, already removed from disk.
#[derive(Debug)]
pub struct TakenArchive {
    pub bytes: Vec<u8>,
    pub cleanup: CleanupReport,
}

pub struct Session {
    lifecycle: Arc<Lifecycle>,
    slot: Mutex<Slot>,
}

impl Session {
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle: Arc::new(lifecycle),
            slot: Mutex::new(Slot::Empty),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Store a new upload, replacing any finished or unstarted job.
    ///
    /// Rejected with `Conflict` while a separation is in flight. Whatever
    /// the previous job left in the workspace is cleaned up first.
    pub async fn upload(&self, asset: UploadedAsset) -> Result<JobSnapshot, CoreError> {
        let mut slot = self.slot.lock().await;

        match &*slot {
            Slot::Running(handle) if handle.is_in_flight() => {
                return Err(CoreError::Conflict(
                    "A file is still being processed".to_string(),
                ));
            }
            Slot::Empty => {}
            Slot::Uploaded(_) | Slot::Running(_) => {
                let report = self.lifecycle.cleanup().await;
                if !report.is_clean() {
                    tracing::warn!(warnings = ?report.warnings, "Previous job left files behind");
                }
            }
        }
        *slot = Slot::Empty;

        let job = self.lifecycle.accept(asset).await?;
        let snapshot = JobSnapshot::new(job.clone(), UPLOADED_MESSAGE);
        *slot = Slot::Uploaded(job);
        Ok(snapshot)
    }

    /// Hand the uploaded job to a background task.
    pub async fn start(&self) -> Result<JobSnapshot, CoreError> {
        let mut slot = self.slot.lock().await;

        let job = match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Uploaded(job) => job,
            Slot::Empty => {
                return Err(CoreError::NotFound("No file has been uploaded".to_string()));
            }
            Slot::Running(handle) => {
                let message = if handle.is_in_flight() {
                    "The file is already being processed"
                } else {
                    "This file has already been processed; upload a new one"
                };
                *slot = Slot::Running(handle);
                return Err(CoreError::Conflict(message.to_string()));
            }
        };

        tracing::info!(job_id = %job.id, "Starting separation");
        let handle = runner::spawn(Arc::clone(&self.lifecycle), job);
        let snapshot = handle.snapshot();
        *slot = Slot::Running(handle);
        Ok(snapshot)
    }

    /// The current job as the UI should show it, if there is one.
    pub async fn snapshot(&self) -> Option<JobSnapshot> {
        match &*self.slot.lock().await {
            Slot::Empty => None,
            Slot::Uploaded(job) => Some(JobSnapshot::new(job.clone(), UPLOADED_MESSAGE)),
            Slot::Running(handle) => Some(handle.snapshot()),
        }
    }

    /// Cancel the in-flight separation.
    pub async fn cancel(&self) -> Result<JobSnapshot, CoreError> {
        match &*self.slot.lock().await {
            Slot::Running(handle) if handle.is_in_flight() => {
                handle.cancel();
                Ok(handle.snapshot())
            }
            _ => Err(CoreError::Conflict("No file is being processed".to_string())),
        }
    }

    /// Where the uploaded audio for the current job lives.
    pub async fn source(&self) -> Result<SourceFile, CoreError> {
        let job = match &*self.slot.lock().await {
            Slot::Uploaded(job) => job.clone(),
            Slot::Running(handle) => handle.snapshot().job,
            Slot::Empty => {
                return Err(CoreError::NotFound("No file has been uploaded".to_string()));
            }
        };
        Ok(SourceFile {
            path: job.source_path,
            original_filename: job.original_filename,
        })
    }

    /// Read the finished archive, then clean the workspace and empty the slot.
    ///
    /// The archive only exists once; a second call is a `Conflict`.
    pub async fn take_archive(&self) -> Result<TakenArchive, CoreError> {
        let mut slot = self.slot.lock().await;

        let archive_path = match &*slot {
            Slot::Running(handle) => {
                let snapshot = handle.snapshot();
                match (snapshot.download_ready(), snapshot.job.archive_path) {
                    (true, Some(path)) => path,
                    _ => return Err(CoreError::Conflict("The archive is not ready".to_string())),
                }
            }
            _ => return Err(CoreError::Conflict("The archive is not ready".to_string())),
        };

        let bytes = tokio::fs::read(&archive_path)
            .await
            .map_err(|e| CoreError::io(&archive_path, e))?;
        let cleanup = self.lifecycle.cleanup().await;
        *slot = Slot::Empty;

        tracing::info!(bytes = bytes.len(), "Archive handed out, workspace cleaned");
        Ok(TakenArchive { bytes, cleanup })
    }

    /// Stop any running job and clean the workspace. Used on server shutdown.
    pub async fn shutdown(&self, grace: Duration) -> CleanupReport {
        let previous = std::mem::replace(&mut *self.slot.lock().await, Slot::Empty);
        if let Slot::Running(handle) = previous {
            if handle.is_in_flight() {
                tracing::info!("Cancelling in-flight job");
                handle.cancel();
            }
            handle.join(grace).await;
        }
        self.lifecycle.cleanup().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;
    use stemsplit_core::job::JobStatus;
    use stemsplit_core::workspace::{is_empty_dir, Workspace};

    use super::*;

    const WRITE_STEMS: &str = r#"f=$(basename "$5"); d="$4/$2/${f%.*}"; mkdir -p "$d" && for s in vocals drums bass other; do printf '%s' "$s" > "$d/$s.wav"; done"#;

    async fn session(dir: &std::path::Path, script: &str) -> Session {
        let engine = CommandEngine::new("sh", vec!["-c".into(), script.into(), "sh".into()], "htdemucs");
        let lifecycle = JobLifecycle::new(Workspace::under(dir), engine);
        lifecycle.initialize_workspace().await.unwrap();
        Session::new(lifecycle)
    }

    async fn wait_finished(session: &Session) -> JobSnapshot {
        for _ in 0..200 {
            if let Some(snapshot) = session.snapshot().await {
                if snapshot.finished {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job did not finish");
    }

    #[tokio::test]
    async fn start_without_upload_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let session = session(tmp.path(), "exit 0").await;

        assert_matches!(session.start().await, Err(CoreError::NotFound(_)));
        assert!(session.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn upload_download_round_trip_leaves_workspace_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let session = session(tmp.path(), WRITE_STEMS).await;

        let uploaded = session
            .upload(UploadedAsset::new("song.mp3", b"mp3".to_vec()))
            .await
            .unwrap();
        assert_eq!(uploaded.job.status, JobStatus::Uploaded);

        session.start().await.unwrap();
        let finished = wait_finished(&session).await;
        assert!(finished.download_ready());

        let taken = session.take_archive().await.unwrap();
        assert!(!taken.bytes.is_empty());
        assert!(taken.cleanup.is_clean());

        let ws = session.lifecycle().workspace();
        assert!(is_empty_dir(ws.upload_root()).await);
        assert!(is_empty_dir(ws.output_root()).await);
        assert!(!ws.archive_path().exists());
        assert!(session.snapshot().await.is_none());
        assert_matches!(session.take_archive().await, Err(CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn second_start_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let session = session(tmp.path(), "exec sleep 30").await;
        session
            .upload(UploadedAsset::new("long.wav", b"wav".to_vec()))
            .await
            .unwrap();

        session.start().await.unwrap();
        assert_matches!(session.start().await, Err(CoreError::Conflict(_)));
        assert_matches!(
            session
                .upload(UploadedAsset::new("other.wav", b"wav".to_vec()))
                .await,
            Err(CoreError::Conflict(_))
        );

        let report = session.shutdown(Duration::from_secs(5)).await;
        assert!(report.is_clean());
        assert!(session.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn failed_job_can_be_replaced_by_new_upload() {
        let tmp = tempfile::tempdir().unwrap();
        let session = session(tmp.path(), "echo 'CUDA out of memory' >&2; exit 1").await;
        session
            .upload(UploadedAsset::new("noise.wav", b"wav".to_vec()))
            .await
            .unwrap();
        session.start().await.unwrap();

        let failed = wait_finished(&session).await;
        assert_eq!(failed.job.status, JobStatus::Failed);
        assert_matches!(session.take_archive().await, Err(CoreError::Conflict(_)));

        let next = session
            .upload(UploadedAsset::new("retry.wav", b"wav".to_vec()))
            .await
            .unwrap();
        assert_eq!(next.job.status, JobStatus::Uploaded);
        assert_eq!(next.job.original_filename, "retry.wav");
    }
}
