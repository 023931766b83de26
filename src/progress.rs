//! Progress event reduction.
//!
//! Pure mapping from one raw engine progress event to a partial task
//! update. The reducer owns two policies the rest of the system relies on:
//!
//! - **Sticky totals**: once a task has any stored `total_bytes`, later
//!   events never replace it — not with an exact figure and not with an
//!   estimate. This keeps `progress` monotonic against engines that
//!   oscillate between exact and estimated sizes.
//! - **Best-effort numeric coercion**: malformed byte counts degrade to
//!   "unknown" instead of failing; progress reporting must never abort a
//!   job.

use crate::store::TaskUpdate;
use crate::types::{ProgressEvent, TaskStatus};

/// Reduce one engine progress event into a partial task update.
///
/// `sticky_total` is the task's currently stored `total_bytes`, read just
/// before the call. Returns None for event kinds with no bearing on task
/// bookkeeping.
pub fn reduce(event: &ProgressEvent, sticky_total: Option<u64>) -> Option<TaskUpdate> {
    match event {
        ProgressEvent::Downloading {
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate,
            speed,
            eta,
        } => {
            let total = sticky_total.or(*total_bytes).or(*total_bytes_estimate);
            let progress = match (*downloaded_bytes, total) {
                (Some(downloaded), Some(total)) if total > 0 => {
                    Some((downloaded as f64 / total as f64).min(1.0))
                }
                _ => None,
            };

            Some(TaskUpdate {
                status: Some(TaskStatus::Downloading),
                downloaded_bytes: *downloaded_bytes,
                total_bytes: total,
                progress,
                speed: *speed,
                eta: *eta,
                ..Default::default()
            })
        }

        ProgressEvent::Finished {
            output_path,
            downloaded_bytes,
        } => {
            let filename = output_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
            let temp_dir = output_path.parent().map(|dir| dir.to_path_buf());

            Some(TaskUpdate {
                status: Some(TaskStatus::Finished),
                progress: Some(1.0),
                downloaded_bytes: *downloaded_bytes,
                filename,
                file_path: Some(output_path.clone()),
                temp_dir,
                ..Default::default()
            })
        }

        ProgressEvent::Other { status } => {
            tracing::trace!(status = %status, "ignoring engine progress state");
            None
        }
    }
}

/// Coerce a JSON value into a byte count.
///
/// Engines report byte counters inconsistently: integers, floats, numeric
/// strings, or junk. Floats truncate, numeric strings parse, anything
/// negative or malformed degrades to None.
pub(crate) fn coerce_bytes(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(int) = n.as_u64() {
                Some(int)
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            }
        }
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<u64>()
                .ok()
                .or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f as u64)
                })
        }
        _ => None,
    }
}
