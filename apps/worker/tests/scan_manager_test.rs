//! Integration tests for the scan job manager
//!
//! This test module covers:
//! - Indexing new files and skipping already indexed ones
//! - Progress reporting for empty and populated directories
//! - Single-run exclusivity and restart after a terminal state
//! - Cancellation of a running scan

mod common;

use assert_matches::assert_matches;
use sha2::{Digest, Sha256};

use common::{eventually, settle, TestEnv};
use mediashelf_test_utils::StaticMetadataExtractor;
use mediashelf_worker::metadata::ExtractedMetadata;
use mediashelf_worker::models::{JobKind, JobStatus, MediaStatus};
use mediashelf_worker::WorkerError;

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

#[tokio::test]
async fn test_empty_inbox_completes_at_full_progress() {
    let env = TestEnv::new();
    env.library.mkdir("TemporaryMedia");
    let manager = env.state.scan_manager();

    manager.start(None).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.kind, Some(JobKind::Scan));
    assert_eq!(state.total, 0);
    assert_eq!(state.processed, 0);
    assert_eq!(state.percentage, 100);
}

#[test_log::test(tokio::test)]
async fn test_scan_indexes_new_files() {
    let env = TestEnv::with_extractor(StaticMetadataExtractor::returning(ExtractedMetadata {
        width: Some(640),
        height: Some(480),
        ..ExtractedMetadata::default()
    }));
    env.library.write("TemporaryMedia/photo.png", PNG_MAGIC);
    env.library.write("TemporaryMedia/nested/notes.txt", b"hello");
    let manager = env.state.scan_manager();

    manager.start(None).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.total, 2);
    assert_eq!(state.processed, 2);
    assert_eq!(state.percentage, 100);

    let photo = env
        .store
        .media_by_path("TemporaryMedia/photo.png")
        .expect("photo indexed");
    assert_eq!(photo.name, "photo.png");
    assert_eq!(photo.mime_type, "image/png");
    assert_eq!(photo.size_bytes, PNG_MAGIC.len() as i64);
    assert_eq!(photo.status, MediaStatus::PendingClassification);
    assert_eq!(photo.width, Some(640));
    assert_eq!(
        photo.content_hash.as_deref(),
        Some(format!("{:x}", Sha256::digest(PNG_MAGIC)).as_str())
    );

    let notes = env
        .store
        .media_by_path("TemporaryMedia/nested/notes.txt")
        .expect("notes indexed");
    assert_eq!(notes.mime_type, "application/octet-stream");
}

#[tokio::test]
async fn test_rescan_skips_indexed_files() {
    let env = TestEnv::new();
    env.library.write("TemporaryMedia/a.txt", b"a");
    env.library.write("TemporaryMedia/b.txt", b"b");
    let manager = env.state.scan_manager();

    manager.start(None).unwrap();
    settle(manager.wait()).await;
    manager.start(None).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.percentage, 100);
    assert!(state.message.contains("0 new, 2 already indexed"), "{}", state.message);
    assert_eq!(env.store.media().len(), 2);
    assert_eq!(env.extractor.calls(), 2);
}

#[tokio::test]
async fn test_explicit_directory_is_scanned() {
    let env = TestEnv::new();
    env.library.write("Movies/clip.txt", b"c");
    env.library.write("TemporaryMedia/ignored.txt", b"i");
    let manager = env.state.scan_manager();

    manager.start(Some("Movies")).unwrap();
    settle(manager.wait()).await;

    let paths: Vec<String> = env.store.media().into_iter().map(|m| m.path).collect();
    assert_eq!(paths, vec!["Movies/clip.txt"]);
    assert_eq!(env.extractor.seen_paths(), vec![env.library.path("Movies/clip.txt")]);
}

#[tokio::test]
async fn test_extraction_failure_still_indexes() {
    let env = TestEnv::with_extractor(StaticMetadataExtractor::failing());
    env.library.write("TemporaryMedia/a.txt", b"a");
    let manager = env.state.scan_manager();

    manager.start(None).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    let record = env.store.media_by_path("TemporaryMedia/a.txt").unwrap();
    assert_eq!(record.width, None);
    assert!(record.content_hash.is_some());
}

#[tokio::test]
async fn test_traversal_rejected_before_start() {
    let env = TestEnv::new();
    let manager = env.state.scan_manager();

    assert_matches!(manager.start(Some("../outside")), Err(WorkerError::PathTraversal(_)));
    assert_eq!(manager.progress().status, JobStatus::Idle);
}

#[tokio::test]
async fn test_missing_directory_fails_job() {
    let env = TestEnv::new();
    let manager = env.state.scan_manager();

    manager.start(Some("DoesNotExist")).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Failed);
    assert!(state.message.contains("not a directory"), "{}", state.message);
}

#[tokio::test]
async fn test_cancel_when_idle_is_noop() {
    let env = TestEnv::new();
    let manager = env.state.scan_manager();

    manager.cancel();

    let state = manager.progress();
    assert_eq!(state.status, JobStatus::Idle);
    assert_eq!(state.kind, None);
}

#[tokio::test]
async fn test_second_start_rejected_while_running() {
    let env = TestEnv::with_extractor(StaticMetadataExtractor::blocking());
    env.library.write("TemporaryMedia/a.txt", b"a");
    let manager = env.state.scan_manager();

    manager.start(None).unwrap();
    eventually(|| env.extractor.calls() == 1).await;

    assert_matches!(manager.start(None), Err(WorkerError::AlreadyRunning(_)));

    manager.cancel();
    let state = settle(manager.wait()).await;
    assert_eq!(state.status, JobStatus::Canceled);
}

#[tokio::test]
async fn test_cancel_stops_scan_and_keeps_counters() {
    let env = TestEnv::with_extractor(StaticMetadataExtractor::blocking());
    env.library.write("TemporaryMedia/a.txt", b"a");
    env.library.write("TemporaryMedia/b.txt", b"b");
    let manager = env.state.scan_manager();

    manager.start(None).unwrap();
    eventually(|| env.extractor.calls() == 1).await;
    manager.cancel();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Canceled);
    assert_eq!(state.total, 2);
    assert_eq!(state.processed, 0);
    assert!(env.store.media().is_empty());
    assert_eq!(env.extractor.calls(), 1);
}

#[tokio::test]
async fn test_restart_after_terminal_state() {
    let env = TestEnv::new();
    env.library.mkdir("TemporaryMedia");
    let manager = env.state.scan_manager();

    manager.start(Some("Missing")).unwrap();
    assert_eq!(settle(manager.wait()).await.status, JobStatus::Failed);

    manager.start(None).unwrap();
    assert_eq!(settle(manager.wait()).await.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_subscribers_observe_terminal_state() {
    let env = TestEnv::new();
    env.library.write("TemporaryMedia/a.txt", b"a");
    let manager = env.state.scan_manager();
    let mut rx = manager.subscribe();

    manager.start(None).unwrap();
    let state = tokio::time::timeout(
        common::JOB_TIMEOUT,
        rx.wait_for(|state| state.status.is_terminal()),
    )
    .await
    .expect("terminal state in time")
    .expect("progress channel open")
    .clone();

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.processed, 1);
}
