//! In-memory task registry guarded by a single lock.
//!
//! The store is the only shared-mutation point in the system. Every
//! operation takes the mutex for its full duration, never blocks on I/O,
//! and applies its changes atomically: a reader gets either the record
//! before an update or after it, never a mix.

use crate::types::{TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// The unit of work tracked by the system.
///
/// `get` hands out deep copies of this, so callers can never observe a
/// record mid-update.
#[derive(Clone, Debug)]
pub struct TaskRecord {
    /// Unique task identifier
    pub task_id: TaskId,
    /// Source URL this task is fetching
    pub url: String,
    /// Current status
    pub status: TaskStatus,
    /// Fractional progress in [0.0, 1.0], None while unknown
    pub progress: Option<f64>,
    /// Bytes downloaded so far
    pub downloaded_bytes: Option<u64>,
    /// Total bytes; sticky once set (see [`TaskStore::update`])
    pub total_bytes: Option<u64>,
    /// Instantaneous speed hint in bytes per second
    pub speed: Option<f64>,
    /// Estimated seconds to completion
    pub eta: Option<f64>,
    /// Output filename, known once finished
    pub filename: Option<String>,
    /// Resolved format-selection expression handed to the engine
    pub format_expr: Option<String>,
    /// Path of the produced artifact; non-None iff status is finished
    pub file_path: Option<PathBuf>,
    /// Scratch workspace owning the artifact, recorded for cleanup
    pub temp_dir: Option<PathBuf>,
    /// Error detail, set only on status error
    pub detail: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last applied update
    pub updated_at: DateTime<Utc>,
}

/// Partial update merged into a [`TaskRecord`] under the store lock.
///
/// A `None` field means "do not change this field" — which is exactly what
/// keeps a previously observed `total_bytes` sticky against later
/// estimate-only progress reports.
#[derive(Clone, Debug, Default)]
pub struct TaskUpdate {
    /// New status, validated against the forward-only transition rules
    pub status: Option<TaskStatus>,
    /// New fractional progress
    pub progress: Option<f64>,
    /// New downloaded byte count
    pub downloaded_bytes: Option<u64>,
    /// New total byte count
    pub total_bytes: Option<u64>,
    /// New speed hint
    pub speed: Option<f64>,
    /// New ETA hint
    pub eta: Option<f64>,
    /// Output filename
    pub filename: Option<String>,
    /// Resolved format expression
    pub format_expr: Option<String>,
    /// Artifact path
    pub file_path: Option<PathBuf>,
    /// Scratch workspace path
    pub temp_dir: Option<PathBuf>,
    /// Error detail
    pub detail: Option<String>,
}

/// In-memory mapping from task identifier to task record.
///
/// Explicitly owned and injected (no process-wide singleton); create one
/// per service instance.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl TaskStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, TaskRecord>> {
        // A poisoned lock means a panic mid-update on another thread; the
        // map itself is still structurally sound, so keep serving.
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate a fresh identifier and insert a `pending` record with
    /// zeroed counters. Never fails.
    pub fn create(&self, url: String) -> TaskId {
        let task_id = TaskId::generate();
        let now = Utc::now();
        let record = TaskRecord {
            task_id,
            url,
            status: TaskStatus::Pending,
            progress: Some(0.0),
            downloaded_bytes: Some(0),
            total_bytes: None,
            speed: None,
            eta: None,
            filename: None,
            format_expr: None,
            file_path: None,
            temp_dir: None,
            detail: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().insert(task_id, record);
        task_id
    }

    /// Merge `update` into the record under the lock.
    ///
    /// No-op if the task no longer exists (already cleaned up). An update
    /// whose status change would move the task backwards (or out of a
    /// terminal state) is dropped whole, so a straggling progress tick can
    /// never un-finish a task or mix its fields into a terminal record.
    pub fn update(&self, task_id: TaskId, update: TaskUpdate) {
        let mut tasks = self.lock();
        let Some(record) = tasks.get_mut(&task_id) else {
            return;
        };

        if let Some(next) = update.status {
            if !record.status.can_transition(next) {
                tracing::debug!(
                    task_id = %task_id,
                    from = %record.status,
                    to = %next,
                    "dropping update with disallowed status transition"
                );
                return;
            }
            record.status = next;
        }
        if let Some(progress) = update.progress {
            record.progress = Some(progress);
        }
        if let Some(downloaded) = update.downloaded_bytes {
            record.downloaded_bytes = Some(downloaded);
        }
        if let Some(total) = update.total_bytes {
            record.total_bytes = Some(total);
        }
        if let Some(speed) = update.speed {
            record.speed = Some(speed);
        }
        if let Some(eta) = update.eta {
            record.eta = Some(eta);
        }
        if let Some(filename) = update.filename {
            record.filename = Some(filename);
        }
        if let Some(format_expr) = update.format_expr {
            record.format_expr = Some(format_expr);
        }
        if let Some(file_path) = update.file_path {
            record.file_path = Some(file_path);
        }
        if let Some(temp_dir) = update.temp_dir {
            record.temp_dir = Some(temp_dir);
        }
        if let Some(detail) = update.detail {
            record.detail = Some(detail);
        }
        record.updated_at = Utc::now();
    }

    /// Return a fully consistent snapshot of the record, or None if the
    /// task does not exist.
    pub fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.lock().get(&task_id).cloned()
    }

    /// Remove the record, returning it so ownership of its artifact
    /// handles transfers to the caller. Idempotent.
    pub fn remove(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.lock().remove(&task_id)
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Identifiers of terminal tasks whose last update is older than
    /// `cutoff`. Used by the optional retention reaper.
    pub fn expired(&self, cutoff: DateTime<Utc>) -> Vec<TaskId> {
        self.lock()
            .values()
            .filter(|r| r.status.is_terminal() && r.updated_at < cutoff)
            .map(|r| r.task_id)
            .collect()
    }
}
