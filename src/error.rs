//! Error types for media-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (engine failures, task lookup failures)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::TaskId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// The submitted URL could not be parsed as an http(s) URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Extraction engine failure surfaced at the synchronous API boundary
    /// (probing); asynchronous download failures are recorded on the task
    /// record instead
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// No task registered under the given identifier
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// The task exists but has not produced an artifact yet
    #[error("task {0} is not finished")]
    NotReady(TaskId),

    /// The task finished but its artifact has vanished from disk
    #[error("artifact for task {0} is no longer available")]
    Gone(TaskId),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Typed failures reported by the extraction engine
///
/// `UnsupportedUrl`, `Network`, `FormatUnavailable` and `NoEntries` are the
/// engine's expected failure taxonomy. `Spawn` and `Other` indicate the
/// taxonomy was incomplete and get extra operator logging in the job runner.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EngineError {
    /// The engine has no extractor for this URL
    #[error("unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// Network-level failure while extracting or downloading
    #[error("network error: {0}")]
    Network(String),

    /// The requested format selection matched nothing
    #[error("requested format is not available: {0}")]
    FormatUnavailable(String),

    /// The URL resolved to a container with nothing downloadable in it
    #[error("no downloadable entries found")]
    NoEntries,

    /// The engine process could not be launched
    #[error("failed to launch extraction engine: {0}")]
    Spawn(String),

    /// Any failure outside the expected taxonomy
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Whether this failure kind is part of the engine's expected taxonomy.
    ///
    /// Unexpected kinds are handled identically for the client but are
    /// additionally logged with full context for operator diagnosis.
    pub fn is_expected(&self) -> bool {
        !matches!(self, EngineError::Spawn(_) | EngineError::Other(_))
    }
}

/// API error response format
///
/// Returned by API endpoints when an error occurs, with a machine-readable
/// code, a human-readable message, and optional contextual details.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "task_not_found",
///     "message": "task 6f2c... not found",
///     "details": {
///       "task_id": "6f2c..."
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "task_not_found")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - client error (invalid input, un-extractable source)
            Error::Config { .. } => 400,
            Error::InvalidUrl(_) => 400,
            Error::Engine(e) => match e {
                // Engine cannot launch — a server-side problem, not the client's URL
                EngineError::Spawn(_) => 503,
                _ => 400,
            },

            // 404 Not Found
            Error::TaskNotFound(_) => 404,

            // 409 Conflict - artifact not produced yet
            Error::NotReady(_) => 409,

            // 410 Gone - artifact produced, then lost
            Error::Gone(_) => 410,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::Engine(e) => match e {
                EngineError::UnsupportedUrl(_) => "unsupported_url",
                EngineError::Network(_) => "network_error",
                EngineError::FormatUnavailable(_) => "format_unavailable",
                EngineError::NoEntries => "no_entries",
                EngineError::Spawn(_) => "engine_unavailable",
                EngineError::Other(_) => "engine_error",
            },
            Error::TaskNotFound(_) => "task_not_found",
            Error::NotReady(_) => "not_ready",
            Error::Gone(_) => "gone",
            Error::Io(_) => "io_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::TaskNotFound(id) | Error::NotReady(id) | Error::Gone(id) => {
                Some(serde_json::json!({
                    "task_id": id,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
