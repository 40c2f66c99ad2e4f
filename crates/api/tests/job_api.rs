//! End-to-end tests for the upload -> process -> download workflow, driven
//! through the HTTP router with `sh` scripts standing in for the engine.

#![cfg(unix)]

mod common;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use axum::http::StatusCode;
use common::{body_bytes, body_json, get, post, upload, wait_until_finished};

fn archive_entries(bytes: Vec<u8>) -> BTreeMap<String, Vec<u8>> {
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut entries = BTreeMap::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).unwrap();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).unwrap();
        entries.insert(entry.name().to_string(), buf);
    }
    entries
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Test: full happy path, from upload to cleaned workspace
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_process_download_cleans_workspace() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path(), common::WRITE_STEMS).await;

    let response = upload(&app.router, "file", "song.mp3", &vec![0u8; 2 * 1024]).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "uploaded");
    assert_eq!(json["data"]["original_filename"], "song.mp3");
    assert_eq!(json["data"]["size_bytes"], 2048);
    assert_eq!(json["data"]["message"], "File uploaded successfully!");
    let stored = json["data"]["stored_filename"].as_str().unwrap().to_string();
    assert!(stored.ends_with("_song.mp3"), "{stored}");
    assert!(tmp.path().join("upload_audio").join(&stored).is_file());

    let response = post(&app.router, "/api/v1/job/process").await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let job = wait_until_finished(&app.router).await;
    assert_eq!(job["status"], "succeeded");
    assert_eq!(job["download_ready"], true);
    assert_eq!(job["message"], "Audio successfully split!");
    assert!(job["diagnostic"].is_null());
    assert_eq!(job["stems"], serde_json::json!(["bass", "drums", "other", "vocals"]));

    let response = get(&app.router, "/api/v1/job/download").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"split_audio_tracks.zip\""
    );

    let entries = archive_entries(body_bytes(response).await);
    let expected: BTreeMap<String, Vec<u8>> = ["bass", "drums", "other", "vocals"]
        .into_iter()
        .map(|s| (format!("{s}.wav"), s.as_bytes().to_vec()))
        .collect();
    assert_eq!(entries, expected);

    assert!(is_empty_dir(&tmp.path().join("upload_audio")));
    assert!(is_empty_dir(&tmp.path().join("split_my_audio")));
    assert!(!tmp.path().join("split_audio_output.zip").exists());

    let json = body_json(get(&app.router, "/api/v1/job").await).await;
    assert!(json["data"].is_null());
}

// ---------------------------------------------------------------------------
// Test: engine failure surfaces stderr and leaves nothing behind
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_failure_reports_stderr_and_cleans_up() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path(), common::FAIL_CUDA).await;

    let response = upload(&app.router, "file", "noise.wav", b"RIFF").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    post(&app.router, "/api/v1/job/process").await;

    let job = wait_until_finished(&app.router).await;
    assert_eq!(job["status"], "failed");
    assert_eq!(job["download_ready"], false);
    assert_eq!(job["failure"]["kind"], "engine_failed");
    assert_eq!(job["failure"]["exit_code"], 1);
    assert!(job["diagnostic"]
        .as_str()
        .unwrap()
        .contains("CUDA out of memory"));

    assert!(is_empty_dir(&tmp.path().join("upload_audio")));
    assert!(!tmp.path().join("split_audio_output.zip").exists());

    let response = get(&app.router, "/api/v1/job/download").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Test: exit 0 without a stem directory is a failure, not a success
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_stems_after_success_exit_fails_job() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path(), common::SILENT_SUCCESS).await;

    upload(&app.router, "file", "song.ogg", b"OggS").await;
    post(&app.router, "/api/v1/job/process").await;

    let job = wait_until_finished(&app.router).await;
    assert_eq!(job["status"], "failed");
    assert_eq!(job["failure"]["kind"], "output_missing");
    assert!(job["diagnostic"]
        .as_str()
        .unwrap()
        .starts_with("Couldn't locate split stems"));
    assert!(!tmp.path().join("split_audio_output.zip").exists());
}

// ---------------------------------------------------------------------------
// Test: unsupported extensions are rejected before anything is stored
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path(), common::WRITE_STEMS).await;

    let response = upload(&app.router, "file", "notes.txt", b"hello").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(is_empty_dir(&tmp.path().join("upload_audio")));
}

#[tokio::test]
async fn extension_check_ignores_case() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path(), common::WRITE_STEMS).await;

    let response = upload(&app.router, "file", "LOUD.FLAC", b"fLaC").await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert!(json["data"]["stored_filename"]
        .as_str()
        .unwrap()
        .ends_with("_LOUD.FLAC"));
}

#[tokio::test]
async fn upload_without_file_field_is_bad_request() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path(), common::WRITE_STEMS).await;

    let response = upload(&app.router, "attachment", "song.mp3", b"ID3").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Test: process before upload is 404; download before processing is 409
// ---------------------------------------------------------------------------

#[tokio::test]
async fn process_without_upload_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path(), common::WRITE_STEMS).await;

    let response = post(&app.router, "/api/v1/job/process").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&app.router, "/api/v1/job/download").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Test: the uploaded file can be previewed with an audio content type
// ---------------------------------------------------------------------------

#[tokio::test]
async fn source_serves_uploaded_audio() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path(), common::WRITE_STEMS).await;
    upload(&app.router, "file", "song.mp3", b"ID3-audio-bytes").await;

    let response = get(&app.router, "/api/v1/job/source").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    assert_eq!(body_bytes(response).await, b"ID3-audio-bytes");
}

// ---------------------------------------------------------------------------
// Test: a running job blocks new work and can be cancelled
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_stops_running_job() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path(), common::HANG).await;
    upload(&app.router, "file", "long.wav", b"RIFF").await;

    let response = post(&app.router, "/api/v1/job/process").await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = post(&app.router, "/api/v1/job/process").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let response = upload(&app.router, "file", "other.wav", b"RIFF").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = post(&app.router, "/api/v1/job/cancel").await;
    assert_eq!(response.status(), StatusCode::OK);

    let job = wait_until_finished(&app.router).await;
    assert_eq!(job["status"], "failed");
    assert_eq!(job["failure"]["kind"], "cancelled");
    assert!(is_empty_dir(&tmp.path().join("upload_audio")));

    let response = post(&app.router, "/api/v1/job/cancel").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Test: uploads over the configured limit are refused
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let app = common::build_test_app(tmp.path(), common::WRITE_STEMS).await;
    let too_big = vec![0u8; app.config.max_upload_bytes + 1];

    let response = upload(&app.router, "file", "huge.wav", &too_big).await;

    assert!(response.status().is_client_error());
    assert!(is_empty_dir(&tmp.path().join("upload_audio")));
}
