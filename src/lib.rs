//! # media-dl
//!
//! Backend library for a media download API around an external extraction
//! engine (yt-dlp). Clients probe a URL for available formats, start a
//! background download job, poll its progress, and fetch the transcoded
//! artifact once — the crate handles the bookkeeping: an in-memory task
//! registry with a concurrency-safe state machine, per-job scratch
//! workspaces, and cleanup tied to artifact delivery.
//!
//! ## Design Philosophy
//!
//! - **Coordination, not extraction** - site parsing and stream retrieval
//!   live behind the [`engine::MediaEngine`] trait
//! - **Library-first** - embed the service, or run the bundled binary
//! - **Event-driven** - consumers subscribe to task events, no polling
//!   required
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, MediaDownloader};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let downloader = Arc::new(MediaDownloader::new((*config).clone())?);
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     media_dl::run_with_shutdown(downloader, config).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Core service implementation (decomposed into focused submodules)
pub mod downloader;
/// Extraction engine abstraction and the yt-dlp implementation
pub mod engine;
/// Error types
pub mod error;
/// Progress event reduction
pub mod progress;
/// Format-selection resolution
pub mod resolver;
/// In-memory task registry
pub mod store;
/// Core types and events
pub mod types;


// Re-export commonly used types
pub use config::{ApiConfig, Config, DownloadConfig, EngineConfig};
pub use downloader::MediaDownloader;
pub use engine::{DownloadRequest, MediaEngine, YtDlpEngine};
pub use error::{ApiError, EngineError, Error, ErrorDetail, Result, ToHttpStatus};
pub use store::{TaskRecord, TaskStore, TaskUpdate};
pub use types::{Event, FormatInfo, MediaInfo, ProgressEvent, TaskId, TaskStatus};

use std::sync::Arc;

/// Run the API server until a termination signal arrives.
///
/// Starts the service's optional background tasks (the expired-task
/// reaper), serves the REST API, and returns when the process receives a
/// termination signal. In-flight jobs are fire-and-forget and die with
/// the process, matching the in-memory, no-persistence design.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(
    downloader: Arc<MediaDownloader>,
    config: Arc<Config>,
) -> Result<()> {
    downloader.start_task_reaper();

    let server = tokio::spawn(api::start_api_server(downloader, config));

    tokio::select! {
        result = server => {
            match result {
                Ok(result) => result,
                Err(e) => Err(error::Error::ApiServerError(format!(
                    "API server task panicked: {e}"
                ))),
            }
        }
        () = wait_for_signal() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
