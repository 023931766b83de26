//! Download job execution — the per-task state machine.
//!
//! Each job runs as an independently scheduled tokio task, spawned at
//! submission time and never awaited by the request that started it. The
//! runner drives a task to exactly one terminal state and owns the scratch
//! workspace for the job's whole lifetime; on success, ownership of the
//! workspace passes to whoever serves the artifact next.

use crate::engine::DownloadRequest;
use crate::progress;
use crate::resolver;
use crate::store::TaskUpdate;
use crate::types::{Event, TaskId, TaskStatus};
use tokio::sync::mpsc;

use super::MediaDownloader;

impl MediaDownloader {
    /// Spawn the asynchronous download job for a freshly created task.
    ///
    /// Fire-and-forget: the handle is returned for tests, but nothing in
    /// the request path waits on it. When an admission bound is
    /// configured, the job waits for a permit before doing any work.
    pub(crate) fn spawn_download_task(
        &self,
        task_id: TaskId,
        format_id: Option<String>,
        format_has_audio: Option<bool>,
        format_has_video: Option<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let limit = self.job_limit.clone();

        tokio::spawn(async move {
            let _permit = match limit {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    // Closed semaphore means shutdown; nothing to run.
                    Err(_) => return,
                },
                None => None,
            };

            downloader
                .run_download_job(task_id, format_id, format_has_audio, format_has_video)
                .await;
        })
    }

    async fn run_download_job(
        &self,
        task_id: TaskId,
        format_id: Option<String>,
        format_has_audio: Option<bool>,
        format_has_video: Option<bool>,
    ) {
        let Some(record) = self.store.get(task_id) else {
            // Force-cleaned before the job got scheduled.
            return;
        };
        let url = record.url;

        // Exclusive scratch workspace; this job is its sole owner until
        // the terminal state decides its fate.
        let scratch = self
            .config
            .download
            .temp_dir
            .join(format!("task_{task_id}"));
        if let Err(e) = tokio::fs::create_dir_all(&scratch).await {
            tracing::error!(task_id = %task_id, error = %e, "failed to create scratch workspace");
            self.fail_task(task_id, format!("failed to create scratch workspace: {e}"));
            return;
        }

        // Resolve and persist the format expression before any bytes move.
        let format_expr = resolver::resolve_format_expression(
            self.engine.as_ref(),
            &url,
            format_id.as_deref(),
            format_has_audio,
            format_has_video,
        )
        .await;
        self.store.update(
            task_id,
            TaskUpdate {
                format_expr: Some(format_expr.clone()),
                ..Default::default()
            },
        );

        self.store.update(
            task_id,
            TaskUpdate {
                status: Some(TaskStatus::Downloading),
                progress: Some(0.0),
                downloaded_bytes: Some(0),
                ..Default::default()
            },
        );

        let (tx, mut rx) = mpsc::channel(64);
        let request = DownloadRequest {
            url: url.clone(),
            format_expr,
            output_dir: scratch.clone(),
        };

        let download = self.engine.download(request, tx);
        let pump = async {
            // Events apply in emission order; the channel closes when the
            // engine drops its sender.
            while let Some(event) = rx.recv().await {
                let sticky_total = self.store.get(task_id).and_then(|t| t.total_bytes);
                let Some(update) = progress::reduce(&event, sticky_total) else {
                    continue;
                };
                self.store.update(task_id, update);
                self.broadcast_state(task_id);
            }
        };
        let (result, ()) = tokio::join!(download, pump);

        match result {
            Ok(()) => match self.store.get(task_id).map(|t| t.status) {
                Some(TaskStatus::Finished) | None => {}
                Some(status) => {
                    // The engine contract requires a Finished event before
                    // returning Ok; reaching here means it broke it.
                    tracing::error!(
                        task_id = %task_id,
                        url = %url,
                        status = %status,
                        "engine completed without reporting an output file"
                    );
                    self.fail_task(
                        task_id,
                        "engine completed without reporting an output file".to_string(),
                    );
                }
            },
            Err(err) => {
                if err.is_expected() {
                    tracing::info!(task_id = %task_id, error = %err, "download failed");
                } else {
                    tracing::error!(
                        task_id = %task_id,
                        url = %url,
                        error = %err,
                        "unexpected engine failure during download"
                    );
                }
                self.fail_task(task_id, err.to_string());
            }
        }

        // Workspace disposition. A finished task keeps its workspace and
        // gets it recorded for later cleanup; anything else reclaims it
        // here, including the case where the record vanished concurrently.
        match self.store.get(task_id) {
            Some(task) if task.status == TaskStatus::Finished => {
                self.store.update(
                    task_id,
                    TaskUpdate {
                        temp_dir: Some(scratch),
                        ..Default::default()
                    },
                );
            }
            _ => {
                let _ = tokio::fs::remove_dir_all(&scratch).await;
            }
        }
    }

    fn fail_task(&self, task_id: TaskId, detail: String) {
        self.store.update(
            task_id,
            TaskUpdate {
                status: Some(TaskStatus::Error),
                detail: Some(detail.clone()),
                ..Default::default()
            },
        );
        let _ = self.event_tx.send(Event::Failed {
            id: task_id,
            error: detail,
        });
    }

    /// Broadcast the task's current state to event subscribers.
    fn broadcast_state(&self, task_id: TaskId) {
        let Some(task) = self.store.get(task_id) else {
            return;
        };
        let event = match task.status {
            TaskStatus::Finished => Event::Finished {
                id: task_id,
                filename: task.filename,
            },
            _ => Event::Downloading {
                id: task_id,
                progress: task.progress,
                downloaded_bytes: task.downloaded_bytes,
                total_bytes: task.total_bytes,
                speed: task.speed,
                eta: task.eta,
            },
        };
        let _ = self.event_tx.send(event);
    }
}
