use super::*;
use crate::error::EngineError;
use crate::test_helpers::{MockEngine, tick};
use crate::types::TaskStatus;
use std::time::Duration;

/// Build a service instance over a throwaway scratch root.
fn test_downloader(engine: MockEngine) -> (MediaDownloader, tempfile::TempDir) {
    let temp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.download.temp_dir = temp.path().to_path_buf();
    let downloader = MediaDownloader::with_engine(config, Arc::new(engine));
    (downloader, temp)
}

async fn wait_for_status(
    downloader: &MediaDownloader,
    task_id: TaskId,
    status: TaskStatus,
) -> crate::store::TaskRecord {
    for _ in 0..400 {
        if let Some(record) = downloader.task(task_id) {
            if record.status == status {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {task_id} never reached {status:?}");
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn successful_job_reaches_finished_with_artifact() {
    let engine = MockEngine::default()
        .with_ticks(vec![tick(512, Some(2048), None), tick(2048, Some(2048), None)])
        .with_artifact("clip.mp4", b"fake video bytes", Some(2048));
    let (downloader, temp) = test_downloader(engine);

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);
    let record = wait_for_status(&downloader, task_id, TaskStatus::Finished).await;

    assert_eq!(record.progress, Some(1.0));
    assert_eq!(record.downloaded_bytes, Some(2048));
    assert_eq!(record.total_bytes, Some(2048));
    assert_eq!(record.filename.as_deref(), Some("clip.mp4"));
    assert_eq!(record.format_expr.as_deref(), Some("bv*+ba/best"));

    let file_path = record.file_path.expect("finished task must carry a file path");
    assert!(file_path.exists(), "artifact must still be on disk");
    assert!(
        file_path.starts_with(temp.path()),
        "artifact must live inside the scratch root"
    );
}

#[tokio::test]
async fn finished_task_records_workspace_for_cleanup() {
    let engine = MockEngine::default().with_artifact("a.mp4", b"x", Some(1));
    let (downloader, temp) = test_downloader(engine);

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);
    // The runner re-records the workspace after the terminal write.
    wait_until(
        || {
            downloader
                .task(task_id)
                .and_then(|t| t.temp_dir)
                .is_some()
        },
        "temp_dir to be recorded",
    )
    .await;

    let record = downloader.task(task_id).unwrap();
    let temp_dir = record.temp_dir.unwrap();
    assert!(temp_dir.starts_with(temp.path()));
    assert!(temp_dir.is_dir(), "workspace must not be deleted on success");
}

#[tokio::test]
async fn first_observed_total_stays_sticky() {
    // First tick only carries an estimate; the later exact figure must
    // not replace it once stored.
    let engine = MockEngine::default()
        .with_ticks(vec![tick(10, None, Some(100)), tick(50, Some(999), None)])
        .with_artifact("v.webm", b"x", None);
    let (downloader, _temp) = test_downloader(engine);

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);
    let record = wait_for_status(&downloader, task_id, TaskStatus::Finished).await;

    assert_eq!(record.total_bytes, Some(100));
}

#[tokio::test]
async fn expected_engine_failure_records_error_and_reclaims_scratch() {
    let engine = MockEngine::default()
        .with_ticks(vec![tick(10, Some(100), None)])
        .failing_download(EngineError::Network("connection reset by peer".into()));
    let (downloader, temp) = test_downloader(engine);

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);
    let record = wait_for_status(&downloader, task_id, TaskStatus::Error).await;

    assert!(record.detail.unwrap().contains("connection reset"));
    assert_eq!(record.file_path, None, "failed task must not advertise a file");

    wait_until(
        || std::fs::read_dir(temp.path()).map(|mut d| d.next().is_none()).unwrap_or(false),
        "scratch workspace removal",
    )
    .await;
}

#[tokio::test]
async fn unexpected_engine_failure_still_lands_in_error_state() {
    let engine = MockEngine::default()
        .failing_download(EngineError::Other("extractor blew up".into()));
    let (downloader, _temp) = test_downloader(engine);

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);
    let record = wait_for_status(&downloader, task_id, TaskStatus::Error).await;
    assert!(record.detail.unwrap().contains("extractor blew up"));
}

#[tokio::test]
async fn engine_success_without_finished_event_is_an_error() {
    // Default mock returns Ok without producing an artifact, breaking the
    // engine contract.
    let engine = MockEngine::default().with_ticks(vec![tick(5, Some(10), None)]);
    let (downloader, temp) = test_downloader(engine);

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);
    let record = wait_for_status(&downloader, task_id, TaskStatus::Error).await;
    assert!(record.detail.unwrap().contains("without reporting an output file"));

    wait_until(
        || std::fs::read_dir(temp.path()).map(|mut d| d.next().is_none()).unwrap_or(false),
        "scratch workspace removal",
    )
    .await;
}

#[tokio::test]
async fn vanished_record_still_gets_its_scratch_reclaimed() {
    let engine = MockEngine::default()
        .with_ticks(vec![tick(1, Some(10), None)])
        .with_delay(Duration::from_millis(150))
        .with_artifact("v.mp4", b"x", None);
    let (downloader, temp) = test_downloader(engine);

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);
    wait_for_status(&downloader, task_id, TaskStatus::Downloading).await;

    // Force-clean the record while the engine is still working.
    let _ = downloader.store.remove(task_id);

    wait_until(
        || std::fs::read_dir(temp.path()).map(|mut d| d.next().is_none()).unwrap_or(false),
        "orphaned scratch workspace removal",
    )
    .await;
    assert!(downloader.task(task_id).is_none());
}

#[tokio::test]
async fn cleanup_task_removes_record_and_artifacts_together() {
    let engine = MockEngine::default().with_artifact("v.mp4", b"video", Some(5));
    let (downloader, temp) = test_downloader(engine);

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);
    let record = wait_for_status(&downloader, task_id, TaskStatus::Finished).await;
    let file_path = record.file_path.unwrap();
    assert!(file_path.exists());

    downloader.cleanup_task(task_id).await;

    assert!(downloader.task(task_id).is_none(), "record must be gone");
    assert!(!file_path.exists(), "artifact must be gone");
    assert!(
        std::fs::read_dir(temp.path()).unwrap().next().is_none(),
        "workspace must be gone"
    );
}

#[tokio::test]
async fn cleanup_task_is_idempotent() {
    let engine = MockEngine::default().with_artifact("v.mp4", b"video", None);
    let (downloader, _temp) = test_downloader(engine);

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);
    wait_for_status(&downloader, task_id, TaskStatus::Finished).await;

    downloader.cleanup_task(task_id).await;
    downloader.cleanup_task(task_id).await;
    assert!(downloader.task(task_id).is_none());
}

#[tokio::test]
async fn lifecycle_events_are_broadcast_in_order() {
    let engine = MockEngine::default()
        .with_ticks(vec![tick(50, Some(100), None)])
        .with_artifact("v.mp4", b"x", Some(100));
    let (downloader, _temp) = test_downloader(engine);
    let mut events = downloader.subscribe();

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);

    let first = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(
        matches!(first, Event::Queued { id, .. } if id == task_id),
        "first event must be Queued, got {first:?}"
    );

    // Drain until the Finished event shows up.
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            Event::Finished { id, filename } => {
                assert_eq!(id, task_id);
                assert_eq!(filename.as_deref(), Some("v.mp4"));
                break;
            }
            Event::Downloading { id, .. } => assert_eq!(id, task_id),
            other => panic!("unexpected event before Finished: {other:?}"),
        }
    }
}

#[tokio::test]
async fn failure_event_carries_engine_message() {
    let engine = MockEngine::default()
        .failing_download(EngineError::UnsupportedUrl("https://nope.example".into()));
    let (downloader, _temp) = test_downloader(engine);
    let mut events = downloader.subscribe();

    let task_id = downloader.start_download("https://nope.example".into(), None, None, None);

    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        if let Event::Failed { id, error } = event {
            assert_eq!(id, task_id);
            assert!(error.contains("nope.example"));
            break;
        }
    }
}

#[tokio::test]
async fn admission_bound_serializes_jobs() {
    let engine = MockEngine::default()
        .with_ticks(vec![tick(1, Some(2), None)])
        .with_delay(Duration::from_millis(300))
        .with_artifact("v.mp4", b"x", None);
    let temp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.download.temp_dir = temp.path().to_path_buf();
    config.download.max_concurrent_jobs = Some(1);
    let downloader = MediaDownloader::with_engine(config, Arc::new(engine));

    let first = downloader.start_download("https://example.com/a".into(), None, None, None);
    let second = downloader.start_download("https://example.com/b".into(), None, None, None);

    // Permit order between the two spawned jobs is not deterministic;
    // whichever got it, the other must still be waiting in pending.
    wait_until(
        || {
            let a = downloader.task(first).unwrap().status;
            let b = downloader.task(second).unwrap().status;
            (a == TaskStatus::Downloading) ^ (b == TaskStatus::Downloading)
        },
        "exactly one job downloading",
    )
    .await;
    let statuses = (
        downloader.task(first).unwrap().status,
        downloader.task(second).unwrap().status,
    );
    assert!(
        matches!(
            statuses,
            (TaskStatus::Downloading, TaskStatus::Pending)
                | (TaskStatus::Pending, TaskStatus::Downloading)
        ),
        "one job must hold the permit while the other waits, got {statuses:?}"
    );

    wait_for_status(&downloader, first, TaskStatus::Finished).await;
    wait_for_status(&downloader, second, TaskStatus::Finished).await;
}

#[tokio::test(start_paused = true)]
async fn reaper_purges_stale_terminal_tasks() {
    let engine = MockEngine::default().with_artifact("v.mp4", b"x", None);
    let temp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.download.temp_dir = temp.path().to_path_buf();
    config.download.task_retention_secs = Some(0);
    let downloader = MediaDownloader::with_engine(config, Arc::new(engine));

    let task_id = downloader.start_download("https://example.com/v".into(), None, None, None);
    wait_for_status(&downloader, task_id, TaskStatus::Finished).await;

    let reaper = downloader.start_task_reaper();
    wait_until(|| downloader.task(task_id).is_none(), "reaper purge").await;
    assert!(downloader.store.is_empty());
    reaper.abort();
}
