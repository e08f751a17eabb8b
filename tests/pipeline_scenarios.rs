// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end pipeline behavior against the in-memory store.

mod common;

use chrono::Duration;
use common::*;
use futures_util::future::join_all;
use std::sync::Arc;
use workout_ingest::error::AppError;
use workout_ingest::models::{IngestEvent, Lineage};
use workout_ingest::services::{Pipeline, TerminalState};

fn lineage() -> Lineage {
    Lineage::new(LINEAGE).unwrap()
}

#[tokio::test]
async fn test_first_ingestion_promotes_everything() {
    let (pipeline, store, notifier) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;

    let outcome = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();

    assert_eq!(outcome.state, TerminalState::Completed);
    assert_eq!(outcome.new_record_count, 2);
    assert_eq!(outcome.total_prior, 0);

    let current = pipeline
        .repository()
        .get_current(&lineage())
        .await
        .unwrap()
        .expect("current snapshot");
    let keys: Vec<&str> = current.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["workout:7434147697", "workout:7434147698"]);
    assert_eq!(current.version_id, outcome.version_id);

    let published = notifier.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].new_record_count, 2);
    assert_eq!(published[0].lineage, LINEAGE);
}

#[tokio::test]
async fn test_second_ingestion_reports_only_new_workout() {
    let (pipeline, store, notifier) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;
    let first = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();

    upload(&store, UPLOAD_KEY, NEW_DATA_CSV).await;
    let second = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();

    assert_eq!(second.state, TerminalState::Completed);
    assert_eq!(second.new_record_count, 1);
    assert_eq!(second.new_record_keys[0].as_str(), "workout:7434147699");
    assert_eq!(second.total_prior, 2);
    assert_eq!(second.total_incoming, 3);
    assert!(second.version_id > first.version_id);

    let published = notifier.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].new_record_keys, vec!["workout:7434147699"]);
    assert!(!published[1].keys_truncated);
}

#[tokio::test]
async fn test_reingesting_same_file_finds_nothing_new() {
    let (pipeline, store, notifier) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;
    pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();
    let again = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();

    assert_eq!(again.new_record_count, 0);
    assert_eq!(again.state, TerminalState::Completed);
    // Still versioned and still notified
    assert_eq!(pipeline.repository().history(&lineage()).await.unwrap().len(), 2);
    assert_eq!(notifier.published().len(), 2);
}

#[tokio::test]
async fn test_malformed_file_leaves_current_untouched() {
    let (pipeline, store, notifier) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;
    pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();
    let before = store.get("current/user2632022_workout_history.csv");

    upload(&store, UPLOAD_KEY, MISSING_COLUMN_CSV).await;
    let result = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await;

    assert!(matches!(result, Err(AppError::Parse(_))));
    assert_eq!(TerminalState::of(&result), TerminalState::Aborted);
    assert_eq!(store.get("current/user2632022_workout_history.csv"), before);
    assert_eq!(pipeline.repository().history(&lineage()).await.unwrap().len(), 1);
    assert_eq!(notifier.published().len(), 1);
}

#[tokio::test]
async fn test_empty_file_is_parse_error() {
    let (pipeline, store, _) = test_pipeline();
    upload(&store, UPLOAD_KEY, "").await;

    let result = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await;
    assert!(matches!(result, Err(AppError::Parse(_))));
    assert!(store.keys().iter().all(|k| k == UPLOAD_KEY));
}

#[tokio::test]
async fn test_notify_failure_keeps_new_snapshot() {
    let store = Arc::new(workout_ingest::storage::MemoryStore::new());
    let pipeline = Pipeline::new(store.clone(), Arc::new(FailingNotifier), 25);
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;

    let outcome = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();

    assert_eq!(outcome.state, TerminalState::CompletedNotifyFailed);
    assert!(outcome.notify_error.is_some());
    let current = pipeline
        .repository()
        .get_current(&lineage())
        .await
        .unwrap()
        .expect("current snapshot");
    assert_eq!(current.version_id, outcome.version_id);
    assert_eq!(current.record_count(), 2);
}

#[tokio::test]
async fn test_archive_write_failure_aborts_without_promotion() {
    let (pipeline, store, notifier) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;
    store.fail_writes_under("archive/");

    let result = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await;

    assert!(matches!(result, Err(AppError::WriteFailure(_))));
    assert!(store.get("current/user2632022_workout_history.csv").is_none());
    assert!(notifier.published().is_empty());

    // Retry after the outage succeeds
    store.clear_failures();
    let outcome = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();
    assert_eq!(outcome.new_record_count, 2);
}

#[tokio::test]
async fn test_promote_failure_retains_archive_copy() {
    let (pipeline, store, _) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;
    store.fail_writes_under("current/");

    let result = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await;

    assert!(matches!(result, Err(AppError::WriteFailure(_))));
    assert_eq!(pipeline.repository().history(&lineage()).await.unwrap().len(), 1);
    assert!(store.get("current/user2632022_workout_history.csv").is_none());
}

#[tokio::test]
async fn test_same_second_ingestions_get_increasing_versions() {
    let (pipeline, store, _) = test_pipeline();
    let pipeline = pipeline.with_clock(fixed_clock(test_instant()));
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;

    let mut versions = Vec::new();
    for _ in 0..3 {
        let outcome = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();
        versions.push(outcome.version_id.unwrap());
    }

    let rendered: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            "20240210090507-0000",
            "20240210090507-0001",
            "20240210090507-0002"
        ]
    );
}

#[tokio::test]
async fn test_clock_skew_does_not_reorder_versions() {
    let (pipeline, store, _) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;

    let ahead = pipeline
        .clone()
        .with_clock(fixed_clock(test_instant() + Duration::hours(2)));
    let first = ahead.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();

    let behind = pipeline.with_clock(fixed_clock(test_instant()));
    let second = behind.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();

    assert!(second.version_id > first.version_id);
    assert_eq!(
        behind.repository().latest_version(&lineage()).await.unwrap(),
        second.version_id
    );
}

#[tokio::test]
async fn test_concurrent_ingestions_of_one_lineage_serialize() {
    let (pipeline, store, notifier) = test_pipeline();
    let pipeline = pipeline.with_clock(fixed_clock(test_instant()));
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;
    upload(&store, "uploads/user2632022_workout_history.csv", NEW_DATA_CSV).await;

    let first = IngestEvent::local(UPLOAD_KEY);
    let second = IngestEvent::local("uploads/user2632022_workout_history.csv");
    let results = join_all([pipeline.process(&first), pipeline.process(&second)]).await;

    for result in &results {
        assert_eq!(TerminalState::of(result), TerminalState::Completed);
    }
    let history = pipeline.repository().history(&lineage()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0] < history[1]);

    // Across both runs, every workout is reported new exactly once
    let total_new: usize = results
        .iter()
        .map(|r| r.as_ref().unwrap().new_record_count)
        .sum();
    let last = results
        .iter()
        .map(|r| r.as_ref().unwrap())
        .max_by_key(|o| o.version_id)
        .unwrap();
    assert_eq!(notifier.published().len(), 2);
    let current = pipeline
        .repository()
        .get_current(&lineage())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.version_id, last.version_id);
    assert_eq!(total_new, 3);
}

#[tokio::test]
async fn test_lineages_are_independent() {
    let (pipeline, store, _) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;
    upload(&store, "user99_workout_history.csv", NEW_DATA_CSV).await;

    pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();
    let other = pipeline
        .process(&IngestEvent::local("user99_workout_history.csv"))
        .await
        .unwrap();

    assert_eq!(other.new_record_count, 3);
    assert_eq!(other.total_prior, 0);
}

#[tokio::test]
async fn test_explicit_lineage_overrides_file_stem() {
    let (pipeline, store, _) = test_pipeline();
    upload(&store, "uploads/export-2024-02-10.csv", SAMPLE_CSV).await;

    let event = IngestEvent::local("uploads/export-2024-02-10.csv").with_lineage(LINEAGE);
    let outcome = pipeline.process(&event).await.unwrap();

    assert_eq!(outcome.lineage, Some(lineage()));
    assert!(store.get("current/user2632022_workout_history.csv").is_some());
}

#[tokio::test]
async fn test_managed_paths_are_ignored() {
    let (pipeline, store, notifier) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;
    let promoted = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();

    let current = pipeline
        .process(&IngestEvent::local("current/user2632022_workout_history.csv"))
        .await
        .unwrap();
    let archived = pipeline
        .process(&IngestEvent::local(promoted.archive_path.unwrap()))
        .await
        .unwrap();

    assert_eq!(current.state, TerminalState::Ignored);
    assert_eq!(archived.state, TerminalState::Ignored);
    assert_eq!(notifier.published().len(), 1);
    assert_eq!(pipeline.repository().history(&lineage()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let (pipeline, _, _) = test_pipeline();
    let result = pipeline
        .process(&IngestEvent::local("nowhere_workout_history.csv"))
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_summary_keys_are_capped() {
    let store = Arc::new(workout_ingest::storage::MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = Pipeline::new(store.clone(), notifier.clone(), 1);
    upload(&store, UPLOAD_KEY, NEW_DATA_CSV).await;

    let outcome = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();

    assert_eq!(outcome.new_record_keys.len(), 3);
    let published = notifier.published();
    assert_eq!(published[0].new_record_count, 3);
    assert_eq!(published[0].new_record_keys, vec!["workout:7434147697"]);
    assert!(published[0].keys_truncated);
}

#[tokio::test]
async fn test_notification_timestamp_follows_pipeline_clock() {
    let (pipeline, store, notifier) = test_pipeline();
    let pipeline = pipeline.with_clock(fixed_clock(test_instant()));
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;

    let outcome = pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();

    let published = notifier.published();
    assert_eq!(published[0].timestamp, "2024-02-10T09:05:07Z");
    assert_eq!(published[0].version_id, outcome.version_id.unwrap().to_string());
    assert!(published[0].version_id.starts_with("20240210090507"));
}

#[tokio::test]
async fn test_lineage_locks_are_released() {
    let (pipeline, store, _) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;
    upload(&store, "user99_workout_history.csv", MISSING_COLUMN_CSV).await;

    pipeline.process(&IngestEvent::local(UPLOAD_KEY)).await.unwrap();
    assert_eq!(pipeline.active_lineage_locks(), 0);

    let rejected = pipeline
        .process(&IngestEvent::local("user99_workout_history.csv"))
        .await;
    assert!(matches!(rejected, Err(AppError::Parse(_))));
    assert_eq!(pipeline.active_lineage_locks(), 0);

    let missing = pipeline
        .process(&IngestEvent::local("nowhere_workout_history.csv"))
        .await;
    assert!(missing.is_err());
    assert_eq!(pipeline.active_lineage_locks(), 0);
}

#[tokio::test]
async fn test_lineage_locks_released_after_concurrent_ingestions() {
    let (pipeline, store, _) = test_pipeline();
    upload(&store, UPLOAD_KEY, SAMPLE_CSV).await;
    upload(&store, "uploads/user2632022_workout_history.csv", NEW_DATA_CSV).await;
    upload(&store, "user99_workout_history.csv", SAMPLE_CSV).await;

    let events = [
        IngestEvent::local(UPLOAD_KEY),
        IngestEvent::local("uploads/user2632022_workout_history.csv"),
        IngestEvent::local("user99_workout_history.csv"),
    ];
    let results = join_all(events.iter().map(|e| pipeline.process(e))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(pipeline.active_lineage_locks(), 0);
}

#[tokio::test]
async fn test_file_name_with_space_gets_sanitized_lineage() {
    let (pipeline, store, _) = test_pipeline();
    upload(&store, "my workouts.csv", SAMPLE_CSV).await;

    let outcome = pipeline
        .process(&IngestEvent::local("my workouts.csv"))
        .await
        .unwrap();

    assert_eq!(outcome.state, TerminalState::Completed);
    assert_eq!(outcome.lineage, Some(Lineage::new("my_workouts").unwrap()));
    assert!(store.get("current/my_workouts.csv").is_some());
}
