//! media-dl server binary.
//!
//! Usage: `media-dl [config.toml]` — with no argument the built-in
//! defaults apply (bind 127.0.0.1:8750, yt-dlp discovered on PATH).

use media_dl::{Config, MediaDownloader};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("media_dl=info,tower_http=info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let config = Arc::new(config);

    let downloader = Arc::new(MediaDownloader::new((*config).clone())?);

    media_dl::run_with_shutdown(downloader, config).await?;
    Ok(())
}
