//! Format-selection resolution.
//!
//! Decides the final format expression handed to the extraction engine
//! from the client's requested format id and optional audio/video
//! capability hints. May re-probe the source to find a compatible
//! audio-only stream to pair with a video-only selection; probe failure
//! never aborts the job — it degrades to a generic best-audio pairing.

use crate::engine::MediaEngine;

/// Expression used when the client requests no specific format:
/// best video+audio, falling back to the best single stream.
pub const DEFAULT_FORMAT_EXPR: &str = "bv*+ba/best";

/// Generic audio request paired with a video-only format when no concrete
/// audio stream can be determined.
pub const GENERIC_AUDIO_EXPR: &str = "bestaudio/best";

/// Resolve the format expression for a download.
///
/// `has_audio` / `has_video` are the caller's assertions about the
/// requested format, when it knows them.
pub async fn resolve_format_expression(
    engine: &dyn MediaEngine,
    url: &str,
    format_id: Option<&str>,
    has_audio: Option<bool>,
    has_video: Option<bool>,
) -> String {
    let Some(format_id) = format_id else {
        return DEFAULT_FORMAT_EXPR.to_string();
    };

    // Caller vouches the format already carries audio, or is audio-only.
    if has_audio == Some(true) || has_video == Some(false) {
        return format_id.to_string();
    }

    let needs_audio = has_audio == Some(false);

    if has_audio.is_none() || (needs_audio && has_video.is_none()) {
        let info = match engine.probe(url).await {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!(
                    url = %url,
                    error = %e,
                    "format probe failed, pairing with generic audio"
                );
                return format!("{format_id}+{GENERIC_AUDIO_EXPR}");
            }
        };

        let Some(selected) = info.formats.iter().find(|f| f.format_id == format_id) else {
            // Unknown id: hand it to the engine verbatim and let the
            // download surface any format error.
            return format_id.to_string();
        };

        if selected.has_audio || !selected.has_video {
            return format_id.to_string();
        }

        let audio_candidate = info
            .formats
            .iter()
            .find(|f| f.has_audio && !f.has_video && f.format_id != format_id);

        return match audio_candidate {
            Some(audio) => format!("{format_id}+{}", audio.format_id),
            None => format!("{format_id}+{GENERIC_AUDIO_EXPR}"),
        };
    }

    // has_audio == Some(false), has_video == Some(true): no probe needed.
    format!("{format_id}+{GENERIC_AUDIO_EXPR}")
}
