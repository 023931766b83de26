use super::*;
use crate::error::EngineError;
use crate::test_helpers::{MockEngine, audio_only_format, muxed_format, tick};
use crate::types::{MediaInfo, TaskId, TaskStatus};
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

/// Build a router over a mock engine and a throwaway scratch root.
fn test_app(engine: MockEngine) -> (Router, Arc<MediaDownloader>, tempfile::TempDir) {
    let temp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.download.temp_dir = temp.path().to_path_buf();
    config.server.api.swagger_ui = false;
    let config = Arc::new(config);
    let downloader = Arc::new(MediaDownloader::with_engine(
        (*config).clone(),
        Arc::new(engine),
    ));
    let app = create_router(downloader.clone(), config);
    (app, downloader, temp)
}

async fn get(app: &Router, path: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, path).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn wait_for_status(downloader: &MediaDownloader, task_id: TaskId, status: TaskStatus) {
    for _ in 0..400 {
        if downloader.task(task_id).map(|t| t.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {task_id} never reached {status:?}");
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (app, _downloader, _temp) = test_app(MockEngine::default());
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn openapi_spec_is_served() {
    let (app, _downloader, _temp) = test_app(MockEngine::default());
    let (status, body) = get_json(&app, "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("openapi").is_some(), "spec must carry a version key");
}

#[tokio::test]
async fn cors_headers_present_when_enabled() {
    let (app, _downloader, _temp) = test_app(MockEngine::default());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

// --- Probe ---

#[tokio::test]
async fn probe_returns_metadata_and_formats() {
    let info = MediaInfo {
        title: Some("A Clip".to_string()),
        duration: Some(42.0),
        uploader: Some("someone".to_string()),
        extractor: Some("youtube".to_string()),
        thumbnail: Some("https://img.example/t.jpg".to_string()),
        is_downloadable: true,
        formats: vec![muxed_format("22"), audio_only_format("140")],
        default_format_id: Some("22".to_string()),
    };
    let (app, _downloader, _temp) = test_app(MockEngine::default().with_probe(Ok(info)));

    let (status, body) =
        post_json(&app, "/probe", json!({"url": "https://example.com/watch?v=a"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "A Clip");
    assert_eq!(body["is_downloadable"], true);
    assert_eq!(body["formats"].as_array().unwrap().len(), 2);
    assert_eq!(body["formats"][0]["format_id"], "22");
    assert_eq!(body["default_format_id"], "22");
    assert_eq!(body["url"], "https://example.com/watch?v=a");
}

#[tokio::test]
async fn probe_rejects_malformed_url() {
    let (app, _downloader, _temp) = test_app(MockEngine::default());
    let (status, body) = post_json(&app, "/probe", json!({"url": "not a url"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_url");
}

#[tokio::test]
async fn probe_rejects_non_http_scheme() {
    let (app, _downloader, _temp) = test_app(MockEngine::default());
    let (status, body) = post_json(&app, "/probe", json!({"url": "ftp://example.com/f"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_url");
}

#[tokio::test]
async fn probe_surfaces_engine_failure_as_400() {
    let engine = MockEngine::default().with_probe(Err(EngineError::UnsupportedUrl(
        "https://unsupported.example/page".to_string(),
    )));
    let (app, _downloader, _temp) = test_app(engine);

    let (status, body) = post_json(
        &app,
        "/probe",
        json!({"url": "https://unsupported.example/page"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "unsupported_url");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("unsupported.example")
    );
}

#[tokio::test]
async fn probe_with_missing_url_field_is_a_client_error() {
    let (app, _downloader, _temp) = test_app(MockEngine::default());
    let (status, _body) = post_json(&app, "/probe", json!({"link": "x"})).await;
    assert!(status.is_client_error(), "got {status}");
}

// --- Submit and poll ---

#[tokio::test]
async fn start_download_returns_task_id_immediately() {
    let engine = MockEngine::default()
        .with_delay(Duration::from_millis(200))
        .with_artifact("v.mp4", b"x", None);
    let (app, downloader, _temp) = test_app(engine);

    let (status, body) = post_json(
        &app,
        "/downloads",
        json!({"url": "https://example.com/watch?v=a"}),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id: TaskId = serde_json::from_value(body["task_id"].clone()).unwrap();

    // The request must not have waited for the job.
    let record = downloader.task(task_id).expect("record exists right away");
    assert!(
        matches!(record.status, TaskStatus::Pending | TaskStatus::Downloading),
        "job must still be in flight, got {:?}",
        record.status
    );
}

#[tokio::test]
async fn start_download_rejects_malformed_url() {
    let (app, downloader, _temp) = test_app(MockEngine::default());
    let (status, body) = post_json(&app, "/downloads", json!({"url": "::::"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_url");
    assert!(downloader.store.is_empty(), "no task may be created");
}

#[tokio::test]
async fn progress_for_unknown_task_is_404() {
    let (app, _downloader, _temp) = test_app(MockEngine::default());
    let (status, body) = get_json(&app, &format!("/downloads/{}", TaskId::generate())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "task_not_found");
}

#[tokio::test]
async fn progress_for_malformed_id_is_a_client_error() {
    let (app, _downloader, _temp) = test_app(MockEngine::default());
    let (status, _body) = get_json(&app, "/downloads/not-a-uuid").await;
    assert!(status.is_client_error(), "got {status}");
}

#[tokio::test]
async fn progress_reports_error_detail_after_failure() {
    let engine = MockEngine::default()
        .failing_download(EngineError::Network("tunnel collapsed".to_string()));
    let (app, downloader, _temp) = test_app(engine);

    let (_, body) = post_json(
        &app,
        "/downloads",
        json!({"url": "https://example.com/watch?v=a"}),
    )
    .await;
    let task_id: TaskId = serde_json::from_value(body["task_id"].clone()).unwrap();
    wait_for_status(&downloader, task_id, TaskStatus::Error).await;

    let (status, body) = get_json(&app, &format!("/downloads/{task_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert!(body["detail"].as_str().unwrap().contains("tunnel collapsed"));
    assert!(body["filename"].is_null());
}

// --- Fetch ---

#[tokio::test]
async fn fetch_before_finish_is_409() {
    let engine = MockEngine::default()
        .with_delay(Duration::from_millis(300))
        .with_artifact("v.mp4", b"x", None);
    let (app, _downloader, _temp) = test_app(engine);

    let (_, body) = post_json(
        &app,
        "/downloads",
        json!({"url": "https://example.com/watch?v=a"}),
    )
    .await;
    let task_id: TaskId = serde_json::from_value(body["task_id"].clone()).unwrap();

    let (status, body) = get_json(&app, &format!("/downloads/{task_id}/file")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "not_ready");
}

#[tokio::test]
async fn full_lifecycle_download_poll_fetch_once() {
    let contents = b"0123456789abcdef";
    let engine = MockEngine::default()
        .with_ticks(vec![tick(8, Some(16), None), tick(16, Some(16), None)])
        .with_artifact("clip.mp4", contents, Some(16));
    let (app, downloader, _temp) = test_app(engine);

    // Submit.
    let (status, body) = post_json(
        &app,
        "/downloads",
        json!({"url": "https://example.com/watch?v=a"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id: TaskId = serde_json::from_value(body["task_id"].clone()).unwrap();

    // Poll until finished.
    wait_for_status(&downloader, task_id, TaskStatus::Finished).await;
    let (status, body) = get_json(&app, &format!("/downloads/{task_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "finished");
    assert_eq!(body["progress"], 1.0);
    assert_eq!(body["downloaded_bytes"], 16);
    assert_eq!(body["filename"], "clip.mp4");
    assert_eq!(body["format_expr"], "bv*+ba/best");

    // Fetch the artifact.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/downloads/{task_id}/file"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "video/mp4"
    );
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(disposition.contains("attachment"));
    assert!(disposition.contains("clip.mp4"));

    let streamed = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(streamed.as_ref(), contents);

    // Cleanup runs once the body has been consumed; the task then reads
    // as not found.
    for _ in 0..400 {
        if downloader.task(task_id).is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let (status, body) = get_json(&app, &format!("/downloads/{task_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "task_not_found");

    // A second fetch for the purged id is also a plain 404.
    let (status, body) = get_json(&app, &format!("/downloads/{task_id}/file")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "task_not_found");
}

#[tokio::test]
async fn fetch_with_vanished_artifact_is_410_then_404() {
    let engine = MockEngine::default().with_artifact("v.mp4", b"bytes", None);
    let (app, downloader, _temp) = test_app(engine);

    let (_, body) = post_json(
        &app,
        "/downloads",
        json!({"url": "https://example.com/watch?v=a"}),
    )
    .await;
    let task_id: TaskId = serde_json::from_value(body["task_id"].clone()).unwrap();
    wait_for_status(&downloader, task_id, TaskStatus::Finished).await;

    // Someone removed the artifact behind the service's back.
    let file_path = downloader.task(task_id).unwrap().file_path.unwrap();
    std::fs::remove_file(&file_path).unwrap();

    let (status, body) = get_json(&app, &format!("/downloads/{task_id}/file")).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"]["code"], "gone");

    // The gone detection purges the record as a side effect.
    let (status, _body) = get_json(&app, &format!("/downloads/{task_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _body) = get_json(&app, &format!("/downloads/{task_id}/file")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
