//! yt-dlp subprocess engine.
//!
//! Drives the yt-dlp binary: `-J` for metadata probes and
//! `--progress-template` JSON lines on stdout for downloads. stderr is
//! collected and classified into the typed [`EngineError`] taxonomy on
//! failure.

use crate::config::EngineConfig;
use crate::error::{EngineError, Error, Result};
use crate::progress::coerce_bytes;
use crate::types::{FormatInfo, MediaInfo, ProgressEvent, sort_formats};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::UNIX_EPOCH;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::{DownloadRequest, MediaEngine};

/// Extraction engine backed by the yt-dlp binary.
pub struct YtDlpEngine {
    binary: PathBuf,
    config: EngineConfig,
}

impl YtDlpEngine {
    /// Build an engine from configuration, resolving the binary either
    /// from the explicit path or by searching PATH.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let binary = match &config.ytdlp_path {
            Some(path) => path.clone(),
            None if config.search_path => {
                which::which("yt-dlp").map_err(|e| Error::Config {
                    message: format!("yt-dlp not found on PATH: {e}"),
                    key: Some("ytdlp_path".to_string()),
                })?
            }
            None => {
                return Err(Error::Config {
                    message: "no ytdlp_path configured and PATH search is disabled".to_string(),
                    key: Some("ytdlp_path".to_string()),
                });
            }
        };

        tracing::info!(binary = %binary.display(), "using extraction engine");
        Ok(Self {
            binary,
            config: config.clone(),
        })
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["--no-warnings".to_string()];
        if self.config.no_check_certificate {
            args.push("--no-check-certificate".to_string());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    fn download_args(&self, request: &DownloadRequest) -> Vec<String> {
        let mut args = self.base_args();
        args.push("--newline".to_string());
        args.push("--no-playlist".to_string());
        if self.config.restrict_filenames {
            args.push("--restrict-filenames".to_string());
        }
        args.push("--progress-template".to_string());
        args.push("download:%(progress)j".to_string());
        args.push("-f".to_string());
        args.push(request.format_expr.clone());
        args.push("-o".to_string());
        args.push(
            request
                .output_dir
                .join("%(title)s.%(ext)s")
                .to_string_lossy()
                .into_owned(),
        );
        if let Some(container) = &self.config.output_container {
            args.push("--merge-output-format".to_string());
            args.push(container.clone());
            args.push("--recode-video".to_string());
            args.push(container.clone());
        }
        args.push("--".to_string());
        args.push(request.url.clone());
        args
    }
}

#[async_trait::async_trait]
impl MediaEngine for YtDlpEngine {
    async fn probe(&self, url: &str) -> std::result::Result<MediaInfo, EngineError> {
        let mut args = self.base_args();
        args.push("-J".to_string());
        args.push("--".to_string());
        args.push(url.to_string());

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        let info: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| EngineError::Other(format!("unparsable engine metadata: {e}")))?;
        parse_media_info(&info)
    }

    async fn download(
        &self,
        request: DownloadRequest,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> std::result::Result<(), EngineError> {
        let args = self.download_args(&request);
        tracing::debug!(url = %request.url, format = %request.format_expr, "launching engine download");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Other("engine stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Other("engine stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        // Per-stream "finished" lines are tracked but not forwarded: with
        // merged video+audio selections the engine finishes each stream
        // separately and the merged artifact only exists after exit.
        let mut last_filename: Option<PathBuf> = None;
        let mut last_bytes: Option<u64> = None;

        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_progress_line(&line) {
                Some(ParsedProgress::Downloading(event)) => {
                    let _ = progress.send(event).await;
                }
                Some(ParsedProgress::StreamFinished { filename, bytes }) => {
                    if filename.is_some() {
                        last_filename = filename;
                    }
                    if bytes.is_some() {
                        last_bytes = bytes;
                    }
                }
                Some(ParsedProgress::Other(status)) => {
                    let _ = progress.send(ProgressEvent::Other { status }).await;
                }
                None => {}
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::Other(format!("failed to wait for engine: {e}")))?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(classify_failure(&stderr_text));
        }

        let Some(output_path) =
            locate_artifact(&request.output_dir, last_filename.as_deref()).await
        else {
            return Err(EngineError::Other(
                "engine reported success but produced no output file".to_string(),
            ));
        };

        let _ = progress
            .send(ProgressEvent::Finished {
                output_path,
                downloaded_bytes: last_bytes,
            })
            .await;

        Ok(())
    }
}

enum ParsedProgress {
    Downloading(ProgressEvent),
    StreamFinished {
        filename: Option<PathBuf>,
        bytes: Option<u64>,
    },
    Other(String),
}

/// Parse one stdout line rendered by the `download:%(progress)j` template.
///
/// Non-progress output returns None and is skipped.
fn parse_progress_line(line: &str) -> Option<ParsedProgress> {
    let trimmed = line.trim();
    let payload = trimmed.strip_prefix("download:").unwrap_or(trimmed);
    if !payload.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(payload).ok()?;
    let status = value.get("status")?.as_str()?;

    match status {
        "downloading" => Some(ParsedProgress::Downloading(ProgressEvent::Downloading {
            downloaded_bytes: value.get("downloaded_bytes").and_then(coerce_bytes),
            total_bytes: value.get("total_bytes").and_then(coerce_bytes),
            total_bytes_estimate: value.get("total_bytes_estimate").and_then(coerce_bytes),
            speed: value.get("speed").and_then(Value::as_f64),
            eta: value.get("eta").and_then(Value::as_f64),
        })),
        "finished" => {
            let filename = value
                .get("filename")
                .or_else(|| value.get("_filename"))
                .and_then(Value::as_str)
                .map(PathBuf::from);
            let bytes = value
                .get("total_bytes")
                .and_then(coerce_bytes)
                .or_else(|| value.get("downloaded_bytes").and_then(coerce_bytes));
            Some(ParsedProgress::StreamFinished { filename, bytes })
        }
        other => Some(ParsedProgress::Other(other.to_string())),
    }
}

/// Map an engine stderr dump onto the typed failure taxonomy.
fn classify_failure(stderr: &str) -> EngineError {
    let message = stderr
        .lines()
        .find(|l| l.trim_start().starts_with("ERROR:"))
        .map(|l| {
            l.trim_start()
                .trim_start_matches("ERROR:")
                .trim()
                .to_string()
        })
        .or_else(|| {
            stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "engine exited with failure".to_string());

    let lowered = message.to_lowercase();
    if lowered.contains("unsupported url") || lowered.contains("is not a valid url") {
        EngineError::UnsupportedUrl(message)
    } else if lowered.contains("requested format is not available") {
        EngineError::FormatUnavailable(message)
    } else if [
        "unable to download",
        "timed out",
        "timeout",
        "connection refused",
        "connection reset",
        "network",
        "getaddrinfo",
        "name resolution",
        "http error 5",
    ]
    .iter()
    .any(|needle| lowered.contains(needle))
    {
        EngineError::Network(message)
    } else {
        EngineError::Other(message)
    }
}

/// Build a [`MediaInfo`] from the engine's `-J` metadata dump.
fn parse_media_info(info: &Value) -> std::result::Result<MediaInfo, EngineError> {
    if info.is_null() {
        return Err(EngineError::Other(
            "no information returned for URL".to_string(),
        ));
    }

    // Some extractors return a bare list of entries; use the first.
    let info = if let Some(list) = info.as_array() {
        list.first().ok_or(EngineError::NoEntries)?
    } else {
        info
    };

    if !info.is_object() {
        return Err(EngineError::Other(
            "unsupported response from extractor".to_string(),
        ));
    }

    let is_playlist = info.get("_type").and_then(Value::as_str) == Some("playlist");
    let has_entries = info
        .get("entries")
        .and_then(Value::as_array)
        .map(|entries| !entries.is_empty())
        .unwrap_or(false);
    let is_downloadable = !is_playlist || has_entries;

    let mut formats = parse_formats(info);
    sort_formats(&mut formats);

    Ok(MediaInfo {
        title: info.get("title").and_then(Value::as_str).map(str::to_string),
        duration: info.get("duration").and_then(Value::as_f64),
        uploader: info
            .get("uploader")
            .and_then(Value::as_str)
            .map(str::to_string),
        extractor: info
            .get("extractor")
            .and_then(Value::as_str)
            .map(str::to_string),
        thumbnail: info
            .get("thumbnail")
            .and_then(Value::as_str)
            .map(str::to_string),
        is_downloadable,
        formats,
        default_format_id: info
            .get("format_id")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn parse_formats(info: &Value) -> Vec<FormatInfo> {
    let Some(raw_formats) = info.get("formats").and_then(Value::as_array) else {
        return vec![];
    };

    raw_formats
        .iter()
        .filter_map(|fmt| {
            let format_id = match fmt.get("format_id") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return None,
            };

            let width = fmt.get("width").and_then(Value::as_u64);
            let height = fmt.get("height").and_then(Value::as_u64);
            let resolution = match (width, height) {
                (Some(w), Some(h)) => Some(format!("{w}x{h}")),
                _ => fmt
                    .get("resolution")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            };

            let acodec = fmt.get("acodec").and_then(Value::as_str).map(str::to_string);
            let vcodec = fmt.get("vcodec").and_then(Value::as_str).map(str::to_string);
            let has_audio = acodec.as_deref().is_some_and(|c| c != "none");
            let has_video = vcodec.as_deref().is_some_and(|c| c != "none");

            Some(FormatInfo {
                format_id,
                ext: fmt.get("ext").and_then(Value::as_str).map(str::to_string),
                resolution,
                fps: fmt.get("fps").and_then(Value::as_f64),
                filesize: fmt.get("filesize").and_then(coerce_bytes),
                filesize_approx: fmt.get("filesize_approx").and_then(coerce_bytes),
                format_note: fmt
                    .get("format_note")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                abr: fmt.get("abr").and_then(Value::as_f64),
                // The engine's "tbr" (total bitrate) is the figure clients
                // sort by, reported here as the video bitrate.
                vbr: fmt.get("tbr").and_then(Value::as_f64),
                acodec,
                vcodec,
                has_audio,
                has_video,
            })
        })
        .collect()
}

fn is_partial(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("part" | "ytdl" | "temp" | "tmp")
    )
}

/// Find the engine's final artifact inside the scratch workspace.
///
/// Prefers the last filename the engine reported if it still exists
/// (post-merge it usually does not), otherwise the most recently modified
/// regular file that is not an in-progress fragment.
async fn locate_artifact(dir: &Path, hint: Option<&Path>) -> Option<PathBuf> {
    if let Some(hint) = hint {
        if tokio::fs::try_exists(hint).await.unwrap_or(false) {
            return Some(hint.to_path_buf());
        }
    }

    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if !is_file || is_partial(&path) {
            continue;
        }
        let modified = entry
            .metadata()
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(UNIX_EPOCH);
        if best.as_ref().is_none_or(|(t, _)| modified >= *t) {
            best = Some((modified, path));
        }
    }
    best.map(|(_, path)| path)
}
