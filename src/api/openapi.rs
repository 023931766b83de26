//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification for the media-dl REST API using
//! utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the media-dl REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation (if enabled)
#[derive(OpenApi)]
#[openapi(
    info(
        title = "media-dl REST API",
        version = "0.2.0",
        description = "REST API for probing media URLs and managing background download tasks",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8750", description = "Local development server")
    ),
    paths(
        crate::api::routes::probe_url,
        crate::api::routes::start_download,
        crate::api::routes::get_progress,
        crate::api::routes::fetch_download,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::TaskId,
        crate::types::TaskStatus,
        crate::types::Event,
        crate::types::FormatInfo,
        crate::types::MediaInfo,

        // Request/response types from api::routes
        crate::api::routes::UrlPayload,
        crate::api::routes::DownloadRequestBody,
        crate::api::routes::DownloadInitResponse,
        crate::api::routes::ProbeResponse,
        crate::api::routes::TaskStatusResponse,

        // Error envelope
        crate::error::ApiError,
        crate::error::ErrorDetail,

        // Config types from config.rs
        crate::config::Config,
        crate::config::DownloadConfig,
        crate::config::EngineConfig,
        crate::config::ApiConfig,
    )),
    tags(
        (name = "probe", description = "Source metadata inspection"),
        (name = "downloads", description = "Download task management"),
        (name = "system", description = "Health, documentation, and events")
    )
)]
pub struct ApiDoc;
