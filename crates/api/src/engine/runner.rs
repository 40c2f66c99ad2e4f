//! Background execution of a single separation job.
//!
//! [`spawn`] moves an uploaded [`Job`] onto its own Tokio task, which drives
//! it through process and package (or cleanup on failure) and publishes a
//! [`JobSnapshot`] after every step on a `watch` channel. Request handlers
//! only ever read the latest snapshot.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stemsplit_core::error::CoreError;
use stemsplit_core::job::{Job, JobFailure, JobStatus};
use stemsplit_core::lifecycle::{JobLifecycle, ProcessOutcome};
use stemsplit_core::separation::SeparationEngine;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const UPLOADED_MESSAGE: &str = "File uploaded successfully!";
pub const PROCESSING_MESSAGE: &str = "Demucs is processing the file. Please wait...";
pub const PACKAGING_MESSAGE: &str = "Packaging split stems...";
pub const SUCCEEDED_MESSAGE: &str = "Audio successfully split!";
pub const CANCELLED_MESSAGE: &str = "Processing cancelled.";
pub const PACKAGING_FAILED_MESSAGE: &str = "Couldn't package split stems.";
pub const PROCESS_ERROR_MESSAGE: &str = "Couldn't process the file.";
pub const CLEANED_MESSAGE: &str = "Cleanup completed. All files removed.";

/// Point-in-time view of a job as seen by the UI.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job: Job,
    /// Status line shown to the user.
    pub message: String,
    /// True once the task has nothing left to do.
    pub finished: bool,
    /// Cleanup problems that did not stop the job from finishing.
    pub warnings: Vec<String>,
    /// Names of the separated stems (`vocals`, `drums`, ...) once known.
    pub stems: Vec<String>,
}

impl JobSnapshot {
    pub fn new(job: Job, message: impl Into<String>) -> Self {
        Self {
            job,
            message: message.into(),
            finished: false,
            warnings: Vec::new(),
            stems: Vec::new(),
        }
    }

    fn finished(job: Job, message: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            job,
            message: message.into(),
            finished: true,
            warnings,
            stems: Vec::new(),
        }
    }

    fn with_stems(mut self, stems: Vec<String>) -> Self {
        self.stems = stems;
        self
    }

    /// The archive exists and can be downloaded.
    pub fn download_ready(&self) -> bool {
        self.finished && self.job.status == JobStatus::Succeeded && self.job.archive_path.is_some()
    }
}

/// Owner-side handle to a running job task.
pub struct JobHandle {
    updates: watch::Receiver<JobSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Latest published snapshot.
    pub fn snapshot(&self) -> JobSnapshot {
        self.updates.borrow().clone()
    }

    /// True while the task has not published its final snapshot.
    pub fn is_in_flight(&self) -> bool {
        !self.updates.borrow().finished
    }

    /// Ask the task to stop the engine. Has no effect once the engine is done.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task to exit, aborting it after `grace`.
    pub async fn join(self, grace: Duration) {
        let abort = self.task.abort_handle();
        match tokio::time::timeout(grace, self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Job task ended abnormally"),
            Err(_) => {
                tracing::warn!(grace_secs = grace.as_secs(), "Job task did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}

/// Start `job` on a background task. The job must be in [`JobStatus::Uploaded`].
pub fn spawn<E>(lifecycle: Arc<JobLifecycle<E>>, job: Job) -> JobHandle
where
    E: SeparationEngine + 'static,
{
    let (tx, rx) = watch::channel(JobSnapshot::new(job.clone(), PROCESSING_MESSAGE));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_job(lifecycle, job, tx, cancel.clone()));

    JobHandle {
        updates: rx,
        cancel,
        task,
    }
}

async fn run_job<E>(
    lifecycle: Arc<JobLifecycle<E>>,
    mut job: Job,
    tx: watch::Sender<JobSnapshot>,
    cancel: CancellationToken,
) where
    E: SeparationEngine,
{
    let job_id = job.id.clone();
    tracing::info!(job_id = %job_id, "Job task started");

    let result = tokio::select! {
        biased;
        outcome = lifecycle.process_observed(&mut job, |j| {
            tx.send_replace(JobSnapshot::new(j.clone(), PROCESSING_MESSAGE));
        }) => Some(outcome),
        () = cancel.cancelled() => None,
    };

    let message = match result {
        Some(Ok(ProcessOutcome::Succeeded { stems })) => {
            let stems: Vec<String> = stems.stems().into_keys().collect();
            tx.send_replace(JobSnapshot::new(job.clone(), PACKAGING_MESSAGE).with_stems(stems.clone()));
            match lifecycle.package(&mut job).await {
                Ok(_) => {
                    tx.send_replace(
                        JobSnapshot::finished(job, SUCCEEDED_MESSAGE, Vec::new()).with_stems(stems),
                    );
                    tracing::info!(job_id = %job_id, "Job ready for download");
                    return;
                }
                // Details are logged by the lifecycle; the job carries a path-free diagnostic.
                Err(_) => job
                    .diagnostic()
                    .unwrap_or_else(|| PACKAGING_FAILED_MESSAGE.to_string()),
            }
        }
        Some(Ok(ProcessOutcome::Failed { failure })) => failure.to_string(),
        Some(Err(e)) => {
            tracing::error!(job_id = %job_id, error = %e, "Job could not be processed");
            user_message(&e)
        }
        None => {
            tracing::info!(job_id = %job_id, "Job cancelled");
            if let Err(e) = mark_cancelled(&mut job) {
                tracing::warn!(job_id = %job_id, error = %e, "Could not record cancellation");
            }
            CANCELLED_MESSAGE.to_string()
        }
    };

    let report = lifecycle.cleanup().await;
    let message = if report.is_clean() {
        format!("{message} {CLEANED_MESSAGE}")
    } else {
        message
    };
    tx.send_replace(JobSnapshot::finished(job, message, report.warnings));
}

/// Text for the UI. I/O errors carry server paths, so only their kind is shown.
fn user_message(err: &CoreError) -> String {
    match err {
        CoreError::Io { source, .. } => format!("{PROCESS_ERROR_MESSAGE} ({})", source.kind()),
        other => other.to_string(),
    }
}

/// Fail a job whose engine run was abandoned. A job cancelled before it
/// reached `Processing` is moved through it first.
fn mark_cancelled(job: &mut Job) -> Result<(), CoreError> {
    match job.status {
        JobStatus::Uploaded => {
            job.start_processing()?;
            job.fail(JobFailure::Cancelled)
        }
        JobStatus::Processing => job.fail(JobFailure::Cancelled),
        JobStatus::Succeeded | JobStatus::Failed => Err(CoreError::Conflict(format!(
            "Job {} already finished as {:?}",
            job.id, job.status
        ))),
    }
}
