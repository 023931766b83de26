//! Core types for media-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a download task
///
/// Generated once at task creation and never reused. Serializes as the
/// bare UUID string.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Task status
///
/// Statuses progress strictly forward: `pending → downloading →
/// {finished | error}`. A task never re-enters an earlier state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, job not yet moving bytes
    Pending,
    /// Download in progress
    Downloading,
    /// Artifact produced and ready to fetch
    Finished,
    /// Job failed
    Error,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Error)
    }

    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// `Downloading → Downloading` is the frequent progress-tick case;
    /// terminal states accept nothing.
    pub fn can_transition(self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => {
                matches!(next, TaskStatus::Downloading | TaskStatus::Error)
            }
            TaskStatus::Downloading => matches!(
                next,
                TaskStatus::Downloading | TaskStatus::Finished | TaskStatus::Error
            ),
            TaskStatus::Finished | TaskStatus::Error => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Finished => "finished",
            TaskStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Raw progress event emitted by the extraction engine for one task
///
/// Events arrive in engine emission order over an mpsc channel and are
/// folded into the task record by [`crate::progress::reduce`].
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Bytes are moving
    Downloading {
        /// Bytes fetched so far, if the engine knows
        downloaded_bytes: Option<u64>,
        /// Exact total size, if the engine knows it
        total_bytes: Option<u64>,
        /// Engine's size estimate when no exact total is available
        total_bytes_estimate: Option<u64>,
        /// Instantaneous speed in bytes per second
        speed: Option<f64>,
        /// Estimated seconds to completion
        eta: Option<f64>,
    },

    /// The engine produced its final artifact
    Finished {
        /// Path of the output file, inside the task's scratch workspace
        output_path: PathBuf,
        /// Best total/downloaded figure the engine reported at completion
        downloaded_bytes: Option<u64>,
    },

    /// Any other engine-reported state; carries no task bookkeeping
    Other {
        /// The raw status string, for trace logging only
        status: String,
    },
}

/// Event broadcast to API subscribers during a task's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task created and queued for download
    Queued {
        /// Task ID
        id: TaskId,
        /// Source URL
        url: String,
    },

    /// Progress update
    Downloading {
        /// Task ID
        id: TaskId,
        /// Fractional progress in [0.0, 1.0], if known
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
        /// Bytes downloaded so far
        #[serde(skip_serializing_if = "Option::is_none")]
        downloaded_bytes: Option<u64>,
        /// Total bytes, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
        /// Current speed in bytes per second
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        /// Estimated seconds to completion
        #[serde(skip_serializing_if = "Option::is_none")]
        eta: Option<f64>,
    },

    /// Artifact ready to fetch
    Finished {
        /// Task ID
        id: TaskId,
        /// Output filename
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },

    /// Job failed
    Failed {
        /// Task ID
        id: TaskId,
        /// Error message
        error: String,
    },

    /// Task record and artifacts reclaimed
    Removed {
        /// Task ID
        id: TaskId,
    },
}

/// One downloadable encoding of a probed source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FormatInfo {
    /// Engine-assigned format identifier
    pub format_id: String,

    /// Container extension (mp4, webm, m4a, ...)
    pub ext: Option<String>,

    /// Resolution as "WIDTHxHEIGHT" when both dimensions are known
    pub resolution: Option<String>,

    /// Frames per second
    pub fps: Option<f64>,

    /// Exact size in bytes, if known
    pub filesize: Option<u64>,

    /// Approximate size in bytes, if only an estimate is available
    pub filesize_approx: Option<u64>,

    /// Engine's free-form note about the format
    pub format_note: Option<String>,

    /// Audio bitrate in kbit/s
    pub abr: Option<f64>,

    /// Video bitrate in kbit/s (engine's total bitrate figure)
    pub vbr: Option<f64>,

    /// Audio codec name, "none" meaning no audio track
    pub acodec: Option<String>,

    /// Video codec name, "none" meaning no video track
    pub vcodec: Option<String>,

    /// Whether the format carries an audio track
    pub has_audio: bool,

    /// Whether the format carries a video track
    pub has_video: bool,
}

impl FormatInfo {
    /// Vertical resolution parsed from the "WxH" resolution string
    pub fn height(&self) -> Option<u32> {
        let resolution = self.resolution.as_deref()?;
        let (_, h) = resolution.split_once('x')?;
        h.parse().ok()
    }
}

/// Sort formats for presentation: audio-carrying first, then descending
/// resolution height, then descending bitrate.
pub fn sort_formats(formats: &mut [FormatInfo]) {
    formats.sort_by(|a, b| {
        b.has_audio
            .cmp(&a.has_audio)
            .then_with(|| b.height().unwrap_or(0).cmp(&a.height().unwrap_or(0)))
            .then_with(|| {
                b.vbr
                    .unwrap_or(0.0)
                    .partial_cmp(&a.vbr.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
}

/// Metadata returned by probing a source URL
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct MediaInfo {
    /// Media title
    pub title: Option<String>,

    /// Duration in seconds
    pub duration: Option<f64>,

    /// Uploader or channel name
    pub uploader: Option<String>,

    /// Name of the site extractor that handled the URL
    pub extractor: Option<String>,

    /// Thumbnail URL
    pub thumbnail: Option<String>,

    /// Whether the resource can be downloaded (a playlist with no
    /// entries cannot)
    pub is_downloadable: bool,

    /// Available formats, sorted by [`sort_formats`] order
    pub formats: Vec<FormatInfo>,

    /// Engine's default format selection for this source
    pub default_format_id: Option<String>,
}
