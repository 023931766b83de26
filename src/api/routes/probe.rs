//! Probe handler: metadata inspection without downloading.

use super::{ProbeResponse, UrlPayload, validate_url};
use crate::api::AppState;
use crate::error::Result;
use axum::{Json, extract::State};

/// POST /probe - Check if the URL is downloadable and return key metadata
#[utoipa::path(
    post,
    path = "/probe",
    tag = "probe",
    request_body = UrlPayload,
    responses(
        (status = 200, description = "Source metadata and available formats", body = ProbeResponse),
        (status = 400, description = "Invalid URL or extraction failure"),
        (status = 503, description = "Extraction engine unavailable")
    )
)]
pub async fn probe_url(
    State(state): State<AppState>,
    Json(payload): Json<UrlPayload>,
) -> Result<Json<ProbeResponse>> {
    let url = validate_url(&payload.url)?;
    let info = state.downloader.probe(url.as_str()).await?;

    Ok(Json(ProbeResponse {
        url: payload.url,
        title: info.title,
        duration: info.duration,
        uploader: info.uploader,
        extractor: info.extractor,
        is_downloadable: info.is_downloadable,
        thumbnail: info.thumbnail,
        formats: info.formats,
        default_format_id: info.default_format_id,
    }))
}
