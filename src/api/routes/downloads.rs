//! Download management handlers: submit, poll, fetch.

use super::{DownloadInitResponse, DownloadRequestBody, TaskStatusResponse, validate_url};
use crate::MediaDownloader;
use crate::api::AppState;
use crate::error::{Error, Result};
use crate::types::{TaskId, TaskStatus};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// POST /downloads - Kick off a background download job
#[utoipa::path(
    post,
    path = "/downloads",
    tag = "downloads",
    request_body = DownloadRequestBody,
    responses(
        (status = 202, description = "Job accepted, poll with the returned task id", body = DownloadInitResponse),
        (status = 400, description = "Invalid URL")
    )
)]
pub async fn start_download(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequestBody>,
) -> Result<(StatusCode, Json<DownloadInitResponse>)> {
    let url = validate_url(&payload.url)?;

    let task_id = state.downloader.start_download(
        url.to_string(),
        payload.format_id,
        payload.format_has_audio,
        payload.format_has_video,
    );

    Ok((StatusCode::ACCEPTED, Json(DownloadInitResponse { task_id })))
}

/// GET /downloads/:id - Poll a task's progress
#[utoipa::path(
    get,
    path = "/downloads/{id}",
    tag = "downloads",
    params(
        ("id" = TaskId, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Current task state", body = TaskStatusResponse),
        (status = 404, description = "Task not found")
    )
)]
pub async fn get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<TaskStatusResponse>> {
    let record = state
        .downloader
        .task(task_id)
        .ok_or(Error::TaskNotFound(task_id))?;
    Ok(Json(record.into()))
}

/// GET /downloads/:id/file - Fetch the finished artifact
///
/// Streams the file as an attachment and schedules cleanup (record
/// removal plus workspace deletion) for when the response body has been
/// fully sent. A second fetch for the same id therefore returns 404.
#[utoipa::path(
    get,
    path = "/downloads/{id}/file",
    tag = "downloads",
    params(
        ("id" = TaskId, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "The media file, streamed as an attachment"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Download is not finished yet"),
        (status = 410, description = "Artifact no longer available; the task record is purged")
    )
)]
pub async fn fetch_download(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> Result<Response> {
    let record = state
        .downloader
        .task(task_id)
        .ok_or(Error::TaskNotFound(task_id))?;

    if record.status != TaskStatus::Finished {
        return Err(Error::NotReady(task_id));
    }
    let Some(path) = record.file_path else {
        return Err(Error::NotReady(task_id));
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "finished artifact vanished from disk");
            state.downloader.cleanup_task(task_id).await;
            return Err(Error::Gone(task_id));
        }
    };

    let download_name = record.filename.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string())
    });
    let content_type = mime_guess::from_path(&download_name).first_or_octet_stream();

    // The guard lives inside the body stream: when the stream is dropped
    // (fully sent, or the client went away), cleanup runs.
    let guard = CleanupGuard {
        downloader: state.downloader.clone(),
        task_id,
    };
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _keep_alive = &guard;
        chunk
    });

    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{download_name}\""),
        ),
    ];

    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

/// Schedules task cleanup when dropped, i.e. when the response body it is
/// embedded in has been fully streamed out.
struct CleanupGuard {
    downloader: Arc<MediaDownloader>,
    task_id: TaskId,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let downloader = Arc::clone(&self.downloader);
        let task_id = self.task_id;
        tokio::spawn(async move {
            downloader.cleanup_task(task_id).await;
        });
    }
}
