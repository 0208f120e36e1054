//! Integration tests for the task job manager
//!
//! This test module covers:
//! - Sequential processing in retrieval order with per-task failure isolation
//! - Missing processors and empty queues
//! - Real move and delete runs against a temporary media root
//! - Restoring the source record when a move fails
//! - Cancellation leaving unstarted tasks pending

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;

use common::{eventually, media_record, settle, ScriptedProcessor, TestEnv};
use mediashelf_worker::jobs::ProcessorRegistry;
use mediashelf_worker::models::{
    JobKind, JobStatus, MediaStatus, OperationType, TaskKind, TaskRecord, TaskStatus,
};
use mediashelf_worker::process::ProcessRunner;
use mediashelf_worker::queue::{MoveRequest, TranscodeRequest};
use mediashelf_worker::WorkerError;
use uuid::Uuid;

fn seed_tasks(env: &TestEnv, operation: OperationType, count: usize) -> Vec<TaskRecord> {
    (0..count)
        .map(|_| {
            let task = TaskRecord::pending(Uuid::new_v4(), operation, json!({}));
            env.store.seed_task(task.clone());
            task
        })
        .collect()
}

// =============================================================================
// Queue draining
// =============================================================================

#[tokio::test]
async fn test_failing_task_does_not_stop_the_run() {
    let env = TestEnv::new();
    let tasks = seed_tasks(&env, OperationType::Move, 3);
    let processor = ScriptedProcessor::new(OperationType::Move).fail_on(tasks[1].id);
    let manager = env
        .state
        .task_manager_with(ProcessorRegistry::new().with(Arc::new(processor.clone())));

    manager.start(TaskKind::Move).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.kind, Some(JobKind::Move));
    assert_eq!(state.total, 3);
    assert_eq!(state.processed, 3);
    assert_eq!(state.percentage, 100);
    assert_eq!(state.message, "All MOVE tasks processed: 2 completed, 1 failed");

    let order: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
    assert_eq!(processor.seen(), order);

    assert_eq!(env.store.task_status(tasks[0].id), Some(TaskStatus::Completed));
    assert_eq!(env.store.task_status(tasks[2].id), Some(TaskStatus::Completed));
    let failed = env.store.task(tasks[1].id).unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error_message.unwrap().contains("scripted failure"));
}

#[tokio::test]
async fn test_only_matching_operation_is_drained() {
    let env = TestEnv::new();
    let moves = seed_tasks(&env, OperationType::Move, 1);
    let deletes = seed_tasks(&env, OperationType::Delete, 1);
    let processor = ScriptedProcessor::new(OperationType::Move);
    let manager = env
        .state
        .task_manager_with(ProcessorRegistry::new().with(Arc::new(processor)));

    manager.start(TaskKind::Move).unwrap();
    settle(manager.wait()).await;

    assert_eq!(env.store.task_status(moves[0].id), Some(TaskStatus::Completed));
    assert_eq!(env.store.task_status(deletes[0].id), Some(TaskStatus::Pending));
}

#[tokio::test]
async fn test_no_pending_tasks_completes_immediately() {
    let env = TestEnv::new();
    let manager = env.state.task_manager();

    manager.start(TaskKind::Delete).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.total, 0);
    assert_eq!(state.percentage, 100);
    assert_eq!(state.message, "No pending DELETE tasks");
}

#[tokio::test]
async fn test_missing_processor_fails_run() {
    let env = TestEnv::new();
    let tasks = seed_tasks(&env, OperationType::Transcode, 1);
    let manager = env.state.task_manager_with(ProcessorRegistry::new());

    manager.start(TaskKind::Transcode).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Failed);
    assert!(state.message.contains("no processor registered"), "{}", state.message);
    assert_eq!(env.store.task_status(tasks[0].id), Some(TaskStatus::Pending));
}

// =============================================================================
// Exclusivity and cancellation
// =============================================================================

#[tokio::test]
async fn test_second_start_rejected_while_running() {
    let env = TestEnv::new();
    let tasks = seed_tasks(&env, OperationType::Move, 1);
    let processor = ScriptedProcessor::new(OperationType::Move).block_on(tasks[0].id);
    let manager = env
        .state
        .task_manager_with(ProcessorRegistry::new().with(Arc::new(processor.clone())));

    manager.start(TaskKind::Move).unwrap();
    eventually(|| processor.seen().len() == 1).await;

    assert_matches!(manager.start(TaskKind::Delete), Err(WorkerError::AlreadyRunning(_)));

    manager.cancel();
    settle(manager.wait()).await;
}

#[tokio::test]
async fn test_cancel_leaves_unstarted_tasks_pending() {
    let env = TestEnv::new();
    let tasks = seed_tasks(&env, OperationType::Move, 3);
    let processor = ScriptedProcessor::new(OperationType::Move).block_on(tasks[0].id);
    let manager = env
        .state
        .task_manager_with(ProcessorRegistry::new().with(Arc::new(processor.clone())));

    manager.start(TaskKind::Move).unwrap();
    eventually(|| processor.seen().len() == 1).await;
    manager.cancel();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Canceled);
    assert_eq!(state.total, 3);
    assert_eq!(state.processed, 0);
    assert_eq!(env.store.task_status(tasks[0].id), Some(TaskStatus::Cancelled));
    assert_eq!(env.store.task_status(tasks[1].id), Some(TaskStatus::Pending));
    assert_eq!(env.store.task_status(tasks[2].id), Some(TaskStatus::Pending));
    assert_eq!(processor.seen().len(), 1);
}

#[tokio::test]
async fn test_restart_after_cancel_processes_remaining() {
    let env = TestEnv::new();
    let tasks = seed_tasks(&env, OperationType::Move, 2);
    let processor = ScriptedProcessor::new(OperationType::Move).block_on(tasks[0].id);
    let manager = env
        .state
        .task_manager_with(ProcessorRegistry::new().with(Arc::new(processor.clone())));

    manager.start(TaskKind::Move).unwrap();
    eventually(|| processor.seen().len() == 1).await;
    manager.cancel();
    settle(manager.wait()).await;

    manager.start(TaskKind::Move).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.total, 1);
    assert_eq!(env.store.task_status(tasks[1].id), Some(TaskStatus::Completed));
}

// =============================================================================
// Real processors
// =============================================================================

#[tokio::test]
async fn test_move_run_relocates_file_and_record() {
    let env = TestEnv::new();
    env.library.write("TemporaryMedia/clip.jpg", b"jpeg");
    let media = media_record("TemporaryMedia/clip.jpg", "image/jpeg");
    env.store.seed_media(media.clone());

    let task = env
        .state
        .task_queue()
        .enqueue_move(
            media.id,
            MoveRequest {
                category_id: Some(3),
                category_path: "/Photos/2024".to_string(),
                rename: Some("beach.jpg".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        env.store.media_by_id(media.id).unwrap().status,
        MediaStatus::Processing
    );

    let manager = env.state.task_manager();
    manager.start(TaskKind::Move).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(env.store.task_status(task.id), Some(TaskStatus::Completed));
    assert!(env.library.exists("Photos/2024/beach.jpg"));
    assert!(!env.library.exists("TemporaryMedia/clip.jpg"));

    let moved = env.store.media_by_id(media.id).unwrap();
    assert_eq!(moved.path, "Photos/2024/beach.jpg");
    assert_eq!(moved.name, "beach.jpg");
    assert_eq!(moved.category_id, Some(3));
    assert_eq!(moved.status, MediaStatus::Available);
}

#[tokio::test]
async fn test_failed_move_restores_source_status() {
    let env = TestEnv::new();
    let media = media_record("TemporaryMedia/gone.jpg", "image/jpeg");
    env.store.seed_media(media.clone());

    let task = env
        .state
        .task_queue()
        .enqueue_move(
            media.id,
            MoveRequest {
                category_path: "/Photos".to_string(),
                ..MoveRequest::default()
            },
        )
        .await
        .unwrap();

    let manager = env.state.task_manager();
    manager.start(TaskKind::Move).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    let failed = env.store.task(task.id).unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error_message.unwrap().contains("not found"));

    let source = env.store.media_by_id(media.id).unwrap();
    assert_eq!(source.status, MediaStatus::Available);
    assert_eq!(source.path, "TemporaryMedia/gone.jpg");
}

#[tokio::test]
async fn test_delete_run_removes_file_record_and_thumbnail() {
    let env = TestEnv::new();
    env.library.write("Photos/a.jpg", b"jpeg");
    env.library.write("Thumbnail/image/a.jpg", b"thumb");
    let mut media = media_record("Photos/a.jpg", "image/jpeg");
    media.thumbnail = Some("Thumbnail/image/a.jpg".to_string());
    env.store.seed_media(media.clone());

    let queue = env.state.task_queue();
    let task = queue.enqueue_delete(media.id).await.unwrap().expect("task queued");
    assert_eq!(queue.enqueue_delete(media.id).await.unwrap(), None);
    assert_eq!(env.store.tasks().len(), 1);

    let manager = env.state.task_manager();
    manager.start(TaskKind::Delete).unwrap();
    settle(manager.wait()).await;

    assert_eq!(env.store.task_status(task.id), Some(TaskStatus::Completed));
    assert!(env.store.media_by_id(media.id).is_none());
    assert!(!env.library.exists("Photos/a.jpg"));
    assert!(!env.library.exists("Thumbnail/image/a.jpg"));
}

#[tokio::test]
async fn test_delete_of_vanished_media_succeeds() {
    let env = TestEnv::new();
    let task = TaskRecord::pending(
        Uuid::new_v4(),
        OperationType::Delete,
        json!({ "originalFilePath": "Photos/never-there.jpg" }),
    );
    env.store.seed_task(task.clone());

    let manager = env.state.task_manager();
    manager.start(TaskKind::Delete).unwrap();
    settle(manager.wait()).await;

    assert_eq!(env.store.task_status(task.id), Some(TaskStatus::Completed));
}

#[tokio::test]
async fn test_malformed_payload_fails_task_only() {
    let env = TestEnv::new();
    let media = media_record("a.jpg", "image/jpeg");
    env.store.seed_media(media.clone());
    let task = TaskRecord::pending(media.id, OperationType::Move, json!({ "bogus": true }));
    env.store.seed_task(task.clone());

    let manager = env.state.task_manager();
    manager.start(TaskKind::Move).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    let failed = env.store.task(task.id).unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error_message.unwrap().contains("invalid payload"));
}

#[tokio::test]
async fn test_failed_transcode_restores_source_and_cleans_scratch() {
    let env = TestEnv::new();
    env.library.write("Movies/clip.mkv", b"not really a video");
    let media = media_record("Movies/clip.mkv", "video/x-matroska");
    env.store.seed_media(media.clone());

    let task = env
        .state
        .task_queue()
        .enqueue_transcode(TranscodeRequest {
            media_id: media.id,
            output_file_name: Some("clip.mp4".to_string()),
            category_path: Some("/Movies".to_string()),
            ..TranscodeRequest::default()
        })
        .await
        .unwrap();

    let mut state = env.state.clone();
    state.runner = ProcessRunner::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
    let manager = state.task_manager();
    manager.start(TaskKind::Transcode).unwrap();
    settle(manager.wait()).await;

    let failed = env.store.task(task.id).unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(
        env.store.media_by_id(media.id).unwrap().status,
        MediaStatus::Available
    );
    assert!(!env.library.exists("Movies/clip.mp4"));
    let scratch: Vec<_> = std::fs::read_dir(env.library.path("VideoTranscodingTemp"))
        .unwrap()
        .collect();
    assert!(scratch.is_empty());
}

#[tokio::test]
async fn test_store_failure_fails_one_task_and_run_continues() {
    let env = TestEnv::new();
    env.library.write("TemporaryMedia/a.jpg", b"a");
    env.library.write("TemporaryMedia/b.jpg", b"b");
    let broken = media_record("TemporaryMedia/a.jpg", "image/jpeg");
    let healthy = media_record("TemporaryMedia/b.jpg", "image/jpeg");
    env.store.seed_media(broken.clone());
    env.store.seed_media(healthy.clone());

    let queue = env.state.task_queue();
    let request = MoveRequest {
        category_path: "/Photos".to_string(),
        ..MoveRequest::default()
    };
    let first = queue.enqueue_move(broken.id, request.clone()).await.unwrap();
    let second = queue.enqueue_move(healthy.id, request).await.unwrap();
    env.store.fail_media_updates(broken.id);

    let manager = env.state.task_manager();
    manager.start(TaskKind::Move).unwrap();
    let state = settle(manager.wait()).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.message, "All MOVE tasks processed: 1 completed, 1 failed");
    assert_eq!(env.store.task_status(first.id), Some(TaskStatus::Failed));
    assert_eq!(env.store.task_status(second.id), Some(TaskStatus::Completed));
    assert_eq!(
        env.store.media_by_id(healthy.id).unwrap().path,
        "Photos/b.jpg"
    );

    // The rejected record update moves the file back where its record points
    let unchanged = env.store.media_by_id(broken.id).unwrap();
    assert_eq!(unchanged.path, "TemporaryMedia/a.jpg");
    assert!(env.library.exists(&unchanged.path));
    assert!(!env.library.exists("Photos/a.jpg"));
}
