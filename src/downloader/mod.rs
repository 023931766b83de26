//! Core service implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`job`] - Download job execution (the per-task state machine)
//! - [`services`] - Background service starters

mod job;
mod services;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::engine::{MediaEngine, YtDlpEngine};
use crate::error::Result;
use crate::store::{TaskRecord, TaskStore};
use crate::types::{Event, TaskId};
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast};

/// Main service instance (cloneable - all fields are Arc-wrapped).
///
/// Owns the task store, the engine handle, and the event channel; every
/// background job runs against a clone of this struct. There is no
/// process-wide singleton — create one per service, or several in tests.
#[derive(Clone)]
pub struct MediaDownloader {
    /// In-memory task registry
    pub(crate) store: Arc<TaskStore>,
    /// Extraction engine (trait object for pluggable implementations)
    pub(crate) engine: Arc<dyn MediaEngine>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Optional admission bound for concurrently running jobs
    pub(crate) job_limit: Option<Arc<Semaphore>>,
}

impl MediaDownloader {
    /// Create a service instance backed by the configured yt-dlp binary.
    pub fn new(config: Config) -> Result<Self> {
        let engine = Arc::new(YtDlpEngine::from_config(&config.engine)?);
        Ok(Self::with_engine(config, engine))
    }

    /// Create a service instance with an injected engine implementation.
    pub fn with_engine(config: Config, engine: Arc<dyn MediaEngine>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let job_limit = config
            .download
            .max_concurrent_jobs
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        Self {
            store: Arc::new(TaskStore::new()),
            engine,
            config: Arc::new(config),
            event_tx,
            job_limit,
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Extract metadata for a URL without downloading anything.
    pub async fn probe(&self, url: &str) -> Result<crate::types::MediaInfo> {
        Ok(self.engine.probe(url).await?)
    }

    /// Create a task and kick off its background download job.
    ///
    /// Returns the task identifier immediately; the job itself is
    /// fire-and-forget and cannot be cancelled.
    pub fn start_download(
        &self,
        url: String,
        format_id: Option<String>,
        format_has_audio: Option<bool>,
        format_has_video: Option<bool>,
    ) -> TaskId {
        let task_id = self.store.create(url.clone());
        let _ = self.event_tx.send(Event::Queued { id: task_id, url });

        self.spawn_download_task(task_id, format_id, format_has_audio, format_has_video);
        task_id
    }

    /// Consistent snapshot of a task record, or None if unknown.
    pub fn task(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.store.get(task_id)
    }

    /// Remove a task record together with its on-disk artifacts.
    ///
    /// The record leaves the store first — so no reader can observe it
    /// advertising artifacts that are being reclaimed — and the artifact
    /// handles it carried are deleted afterwards, best-effort. Idempotent.
    pub async fn cleanup_task(&self, task_id: TaskId) {
        let Some(record) = self.store.remove(task_id) else {
            return;
        };

        if let Some(path) = &record.file_path {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::debug!(task_id = %task_id, error = %e, "artifact file already gone");
            }
        }
        if let Some(dir) = &record.temp_dir {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }

        let _ = self.event_tx.send(Event::Removed { id: task_id });
        tracing::debug!(task_id = %task_id, "task record and artifacts reclaimed");
    }
}
