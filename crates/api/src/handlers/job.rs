//! Handlers for the single-job workflow: upload, process, poll, cancel,
//! preview and download.

use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use stemsplit_core::job::{JobFailure, JobStatus};
use stemsplit_core::upload::{self, UploadedAsset};

use crate::config::DOWNLOAD_FILENAME;
use crate::engine::JobSnapshot;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the audio file.
const FILE_FIELD: &str = "file";

/// What the UI needs to render the current job.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub size_bytes: u64,
    /// Upload size in megabytes, rounded to two decimals.
    pub size_mb: f64,
    pub status: JobStatus,
    pub message: String,
    /// Error text to show verbatim when the job failed.
    pub diagnostic: Option<String>,
    pub failure: Option<JobFailure>,
    pub finished: bool,
    pub download_ready: bool,
    pub warnings: Vec<String>,
    /// Stem names in the archive, e.g. `["bass", "drums", "other", "vocals"]`.
    pub stems: Vec<String>,
}

impl From<JobSnapshot> for JobView {
    fn from(snapshot: JobSnapshot) -> Self {
        let download_ready = snapshot.download_ready();
        let JobSnapshot {
            job,
            message,
            finished,
            warnings,
            stems,
        } = snapshot;

        Self {
            size_mb: (job.size_mb() * 100.0).round() / 100.0,
            diagnostic: job.diagnostic(),
            id: job.id,
            original_filename: job.original_filename,
            stored_filename: job.stored_filename,
            size_bytes: job.size_bytes,
            status: job.status,
            message,
            failure: job.failure,
            finished,
            download_ready,
            warnings,
            stems,
        }
    }
}

/// POST /api/v1/job/upload
///
/// Accept one audio file from the `file` multipart field. The extension must
/// be one of mp3, wav, flac, ogg or m4a (any case).
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<JobView>>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = upload::base_filename(field.file_name().unwrap_or_default()).to_string();
        if filename.is_empty() {
            return Err(AppError::BadRequest("Uploaded file has no name".to_string()));
        }
        upload::check_extension(&filename)?;

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let snapshot = state
            .session
            .upload(UploadedAsset::new(filename, data.to_vec()))
            .await?;

        return Ok((
            StatusCode::CREATED,
            Json(DataResponse {
                data: snapshot.into(),
            }),
        ));
    }

    Err(AppError::BadRequest(format!(
        "Missing multipart field '{FILE_FIELD}'"
    )))
}

/// GET /api/v1/job
///
/// Current job, or `null` when nothing has been uploaded.
pub async fn get_job(State(state): State<AppState>) -> Json<DataResponse<Option<JobView>>> {
    let data = state.session.snapshot().await.map(JobView::from);
    Json(DataResponse { data })
}

/// POST /api/v1/job/process
///
/// Start separation in the background. Poll `GET /api/v1/job` for progress.
pub async fn process_job(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<DataResponse<JobView>>)> {
    let snapshot = state.session.start().await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: snapshot.into(),
        }),
    ))
}

/// POST /api/v1/job/cancel
pub async fn cancel_job(State(state): State<AppState>) -> AppResult<Json<DataResponse<JobView>>> {
    let snapshot = state.session.cancel().await?;
    Ok(Json(DataResponse {
        data: snapshot.into(),
    }))
}

/// GET /api/v1/job/source
///
/// The uploaded audio, for the in-page player.
pub async fn get_source(State(state): State<AppState>) -> AppResult<Response> {
    let source = state.session.source().await?;
    let bytes = match tokio::fs::read(&source.path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::Core(stemsplit_core::error::CoreError::NotFound(
                "The uploaded file has already been cleaned up".to_string(),
            )));
        }
        Err(e) => {
            return Err(AppError::InternalError(format!(
                "Failed to read {}: {e}",
                source.path.display()
            )));
        }
    };

    let content_type = upload::check_extension(&source.original_filename)
        .map(|ext| audio_content_type(&ext))
        .unwrap_or("application/octet-stream");

    Ok(([(header::CONTENT_TYPE, content_type)], Body::from(bytes)).into_response())
}

/// GET /api/v1/job/download
///
/// Hand out the stem archive as `split_audio_tracks.zip`. The workspace is
/// cleaned as soon as the bytes are in memory, so this succeeds once per job.
pub async fn download_archive(State(state): State<AppState>) -> AppResult<Response> {
    let taken = state.session.take_archive().await?;
    if !taken.cleanup.is_clean() {
        tracing::warn!(warnings = ?taken.cleanup.warnings, "Cleanup after download was incomplete");
    }

    let disposition = format!("attachment; filename=\"{DOWNLOAD_FILENAME}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(taken.bytes),
    )
        .into_response())
}

fn audio_content_type(ext: &str) -> &'static str {
    match ext {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}
