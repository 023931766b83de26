//! Extraction engine abstraction.
//!
//! The engine is an opaque collaborator: it accepts a URL plus a format
//! selector and emits progress events and a final artifact path (or a
//! typed failure). Everything site-specific lives behind [`MediaEngine`];
//! the rest of the crate only does bookkeeping around it.

use crate::error::EngineError;
use crate::types::{MediaInfo, ProgressEvent};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

mod ytdlp;

pub use ytdlp::YtDlpEngine;

/// One download job handed to the engine.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// Source URL
    pub url: String,
    /// Resolved format-selection expression
    pub format_expr: String,
    /// Scratch workspace the engine must write its output into
    pub output_dir: PathBuf,
}

/// The extraction/download engine interface.
///
/// `download` streams [`ProgressEvent`]s through the given sender in
/// emission order and must emit a final [`ProgressEvent::Finished`] with
/// the artifact path before returning Ok. On failure it returns a typed
/// [`EngineError`] and emits nothing further.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Extract metadata for a URL without downloading anything.
    async fn probe(&self, url: &str) -> Result<MediaInfo, EngineError>;

    /// Run one download job to completion, streaming progress events.
    async fn download(
        &self,
        request: DownloadRequest,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> Result<(), EngineError>;
}
