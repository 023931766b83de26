//! API route handlers and request/response types.

mod downloads;
mod probe;
mod system;

// Re-export all handlers so `routes::function_name` continues to work
pub use downloads::*;
pub use probe::*;
pub use system::*;

use crate::error::Error;
use crate::store::TaskRecord;
use crate::types::{FormatInfo, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body carrying just a media URL
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct UrlPayload {
    /// The media URL to inspect
    pub url: String,
}

/// Request body to start a download job
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct DownloadRequestBody {
    /// The media URL to download
    pub url: String,

    /// Requested format identifier (None = best available)
    #[serde(default)]
    pub format_id: Option<String>,

    /// Caller's assertion that the requested format carries audio
    #[serde(default)]
    pub format_has_audio: Option<bool>,

    /// Caller's assertion that the requested format carries video
    #[serde(default)]
    pub format_has_video: Option<bool>,
}

/// Response to a download submission
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadInitResponse {
    /// Identifier to poll and fetch with
    pub task_id: TaskId,
}

/// Probe result for a media URL
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProbeResponse {
    /// The probed URL, echoed back
    pub url: String,
    /// Media title
    pub title: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Uploader or channel name
    pub uploader: Option<String>,
    /// Site extractor that handled the URL
    pub extractor: Option<String>,
    /// Whether the resource can be downloaded
    pub is_downloadable: bool,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
    /// Available formats, best first
    pub formats: Vec<FormatInfo>,
    /// Engine's default format selection
    pub default_format_id: Option<String>,
}

/// Poll response describing a task's current state
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskStatusResponse {
    /// Task identifier
    pub task_id: TaskId,
    /// Current status
    pub status: TaskStatus,
    /// Fractional progress in [0.0, 1.0], if known
    pub progress: Option<f64>,
    /// Bytes downloaded so far
    pub downloaded_bytes: Option<u64>,
    /// Total bytes, if known
    pub total_bytes: Option<u64>,
    /// Current speed in bytes per second
    pub speed: Option<f64>,
    /// Estimated seconds to completion
    pub eta: Option<f64>,
    /// Output filename, once known
    pub filename: Option<String>,
    /// Resolved format-selection expression
    pub format_expr: Option<String>,
    /// Error detail, once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<TaskRecord> for TaskStatusResponse {
    fn from(record: TaskRecord) -> Self {
        Self {
            task_id: record.task_id,
            status: record.status,
            progress: record.progress,
            downloaded_bytes: record.downloaded_bytes,
            total_bytes: record.total_bytes,
            speed: record.speed,
            eta: record.eta,
            filename: record.filename,
            format_expr: record.format_expr,
            detail: record.detail,
        }
    }
}

/// Validate a client-submitted URL: must parse and be http(s).
pub(crate) fn validate_url(raw: &str) -> Result<url::Url, Error> {
    let parsed = url::Url::parse(raw).map_err(|_| Error::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(Error::InvalidUrl(raw.to_string())),
    }
}
