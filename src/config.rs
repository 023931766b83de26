//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use utoipa::ToSchema;

/// Download behavior configuration (scratch space, concurrency, retention)
///
/// Groups settings for how jobs are admitted and where their scratch
/// workspaces live. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Root directory for per-task scratch workspaces (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum concurrently running jobs (default: None = unbounded)
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,

    /// Seconds to keep terminal tasks that were never fetched
    /// (default: None = keep forever; the record and workspace leak until
    /// the client fetches)
    #[serde(default)]
    pub task_retention_secs: Option<u64>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_concurrent_jobs: None,
            task_retention_secs: None,
        }
    }
}

/// Extraction engine configuration (binary discovery and invocation flags)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EngineConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for the engine binary if no explicit path is
    /// set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Skip TLS certificate verification in the engine (default: true)
    #[serde(default = "default_true")]
    pub no_check_certificate: bool,

    /// Restrict output filenames to ASCII and no spaces (default: true)
    #[serde(default = "default_true")]
    pub restrict_filenames: bool,

    /// Container to merge/convert the final artifact into
    /// (default: "mp4"; None leaves the engine's native container)
    #[serde(default = "default_output_container")]
    pub output_container: Option<String>,

    /// Extra arguments appended to every engine invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
            no_check_certificate: true,
            restrict_filenames: true,
            output_container: default_output_container(),
            extra_args: vec![],
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8750)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for the media-dl service
///
/// Sub-config fields are flattened for a flat TOML/JSON file format.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Extraction engine settings
    #[serde(flatten)]
    pub engine: EngineConfig,

    /// API server settings
    #[serde(flatten)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        toml::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })
    }
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_true() -> bool {
    true
}

fn default_output_container() -> Option<String> {
    Some("mp4".to_string())
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8750))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}
