// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use workout_ingest::config::Config;
use workout_ingest::error::{AppError, Result};
use workout_ingest::routes::create_router;
use workout_ingest::services::{Notification, Notifier, Pipeline};
use workout_ingest::storage::{MemoryStore, ObjectStore, WriteCondition};
use workout_ingest::AppState;

#[allow(unused_imports)]
pub use workout_ingest::time_utils::fixed_clock;

#[allow(dead_code)]
pub const LINEAGE: &str = "user2632022_workout_history";
#[allow(dead_code)]
pub const UPLOAD_KEY: &str = "user2632022_workout_history.csv";

/// Two workouts: 7434147697 and 7434147698.
#[allow(dead_code)]
pub const SAMPLE_CSV: &str = include_str!("../fixtures/user2632022_workout_history.csv");

/// The sample plus workout 7434147699.
#[allow(dead_code)]
pub const NEW_DATA_CSV: &str = include_str!("../fixtures/user2632022_workout_history_new.csv");

/// Lacks the required Link column.
#[allow(dead_code)]
pub const MISSING_COLUMN_CSV: &str = include_str!("../fixtures/missing_link_column.csv");

/// Notifier that keeps every published notification.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<Notification>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn published(&self) -> Vec<Notification> {
        self.published
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        self.published
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notification.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

/// Notifier whose channel is always down.
#[allow(dead_code)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn publish(&self, _notification: &Notification) -> Result<()> {
        Err(AppError::Notify("topic unavailable".to_string()))
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

/// 2024-02-10T09:05:07Z
#[allow(dead_code)]
pub fn test_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 10, 9, 5, 7).unwrap()
}

/// Put an uploaded file in the store, as the trigger would find it.
#[allow(dead_code)]
pub async fn upload(store: &MemoryStore, key: &str, contents: &str) {
    store
        .write(key, contents.as_bytes().to_vec(), WriteCondition::Overwrite)
        .await
        .expect("upload failed");
}

/// Pipeline over a fresh in-memory store with a recording notifier.
#[allow(dead_code)]
pub fn test_pipeline() -> (Pipeline, Arc<MemoryStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = Pipeline::new(store.clone(), notifier.clone(), 25);
    (pipeline, store, notifier)
}

/// Create a test app with offline in-memory dependencies.
/// Returns the router, the shared state and the backing store.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MemoryStore>) {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(
    config: Config,
) -> (axum::Router, Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(RecordingNotifier::default()),
        config.max_summary_records,
    );
    let state = Arc::new(AppState { config, pipeline });
    (create_router(state.clone()), state, store)
}
