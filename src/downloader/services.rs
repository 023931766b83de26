//! Background service starters — the expired-task reaper.

use chrono::Utc;

use super::MediaDownloader;

impl MediaDownloader {
    /// Start the expired-task reaper background task.
    ///
    /// Only runs when `task_retention_secs` is configured; by default
    /// never-fetched terminal tasks (and their scratch workspaces) are
    /// kept forever.
    pub fn start_task_reaper(&self) -> tokio::task::JoinHandle<()> {
        let Some(retention_secs) = self.config.download.task_retention_secs else {
            tracing::info!("task retention not configured, skipping reaper");
            return tokio::spawn(async {});
        };

        let retention =
            chrono::Duration::seconds(i64::try_from(retention_secs).unwrap_or(i64::MAX));
        let period = std::time::Duration::from_secs(retention_secs.clamp(1, 60));
        let downloader = self.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let cutoff = Utc::now() - retention;
                for task_id in downloader.store.expired(cutoff) {
                    tracing::info!(task_id = %task_id, "reaping expired task");
                    downloader.cleanup_task(task_id).await;
                }
            }
        });

        tracing::info!(retention_secs, "task reaper background task started");
        handle
    }
}
