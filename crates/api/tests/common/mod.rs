#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use stemsplit_api::config::ServerConfig;
use stemsplit_api::router::build_app_router;
use stemsplit_api::session::{Lifecycle, Session};
use stemsplit_api::state::AppState;

/// Engine script that writes four stems where the real engine would.
///
/// Arguments follow the engine layout: `-n <model> -o <out> <input>`.
pub const WRITE_STEMS: &str = r#"f=$(basename "$5"); d="$4/$2/${f%.*}"; mkdir -p "$d" && for s in vocals drums bass other; do printf '%s' "$s" > "$d/$s.wav"; done"#;

/// Engine script that fails the way an out-of-memory GPU run does.
pub const FAIL_CUDA: &str = "echo 'CUDA out of memory' >&2; exit 1";

/// Engine script that exits 0 without writing anything.
pub const SILENT_SUCCESS: &str = "exit 0";

/// Engine script that runs until killed.
pub const HANG: &str = "exec sleep 30";

const BOUNDARY: &str = "stemsplit-test-boundary";

/// Build a test `ServerConfig` rooted at `dir`, running `script` through `sh`.
pub fn test_config(dir: &Path, script: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        upload_dir: dir.join("upload_audio").display().to_string(),
        output_dir: dir.join("split_my_audio").display().to_string(),
        archive_path: dir.join("split_audio_output.zip").display().to_string(),
        engine_program: "sh".to_string(),
        engine_args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        engine_model: "htdemucs".to_string(),
        engine_timeout_secs: None,
        max_upload_bytes: 1024 * 1024,
    }
}

/// A test application plus the config it was built from.
pub struct TestApp {
    pub router: Router,
    pub config: ServerConfig,
    pub session: Arc<Session>,
}

/// Build the full application router with all middleware layers.
///
/// Uses the same [`build_app_router`] as `main.rs`, so integration tests
/// exercise the production middleware stack.
pub async fn build_test_app(dir: &Path, script: &str) -> TestApp {
    let config = test_config(dir, script);
    let lifecycle = Lifecycle::new(config.workspace(), config.engine());
    lifecycle.initialize_workspace().await.unwrap();

    let session = Arc::new(Session::new(lifecycle));
    let state = AppState {
        config: Arc::new(config.clone()),
        session: Arc::clone(&session),
    };

    TestApp {
        router: build_app_router(state, &config),
        config,
        session,
    }
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty(), None).await
}

pub async fn post(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, Body::empty(), None).await
}

/// POST a multipart body with a single file part named `field`.
pub async fn upload(app: &Router, field: &str, filename: &str, bytes: &[u8]) -> Response<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    send(
        app,
        Method::POST,
        "/api/v1/job/upload",
        Body::from(body),
        Some(format!("multipart/form-data; boundary={BOUNDARY}")),
    )
    .await
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Body,
    content_type: Option<String>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header("content-type", ct);
    }
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Poll `GET /api/v1/job` until the job reports `finished`.
pub async fn wait_until_finished(app: &Router) -> serde_json::Value {
    for _ in 0..200 {
        let response = get(app, "/api/v1/job").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if json["data"]["finished"] == true {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job did not finish in time");
}
