// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Workout-Ingest: versioned snapshots of workout history exports
//!
//! This crate ingests workout-history CSV exports as they arrive, detects
//! which records are new relative to the last stored snapshot, persists a
//! versioned snapshot and publishes a notification of the new records.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
pub mod time_utils;

use config::Config;
use services::notifier::DEFAULT_PUBSUB_BASE_URL;
use services::{GoogleTokenSource, LogNotifier, Notifier, Pipeline, PubSubNotifier};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub pipeline: Pipeline,
}

impl AppState {
    /// Build storage, notifier and pipeline as selected by `config`.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let tokens = if needs_google_credentials(&config) {
            tracing::info!("Loading Google application default credentials");
            Some(Arc::new(GoogleTokenSource::from_environment().await?))
        } else {
            None
        };

        let store = storage::build_store(&config, http.clone(), tokens.clone()).await?;
        let notifier = build_notifier(&config, http, tokens);
        tracing::info!(
            store = %store.describe(),
            notifier = %notifier.describe(),
            "Pipeline initialized"
        );

        let pipeline = Pipeline::new(store, notifier, config.max_summary_records);
        Ok(Self { config, pipeline })
    }
}

/// True when a Google API is reached without an emulator in front of it.
fn needs_google_credentials(config: &Config) -> bool {
    let gcs = matches!(config.storage, config::StorageMode::Gcs { .. })
        && config.storage_emulator_host.is_none();
    let pubsub = config.notify_topic.is_some() && config.pubsub_emulator_host.is_none();
    gcs || pubsub
}

fn build_notifier(
    config: &Config,
    http: reqwest::Client,
    tokens: Option<Arc<GoogleTokenSource>>,
) -> Arc<dyn Notifier> {
    let Some(topic) = &config.notify_topic else {
        return Arc::new(LogNotifier);
    };

    match &config.pubsub_emulator_host {
        Some(host) => Arc::new(PubSubNotifier::new(
            http,
            &config.gcp_project_id,
            topic,
            host,
            None,
        )),
        None => Arc::new(PubSubNotifier::new(
            http,
            &config.gcp_project_id,
            topic,
            DEFAULT_PUBSUB_BASE_URL,
            tokens,
        )),
    }
}
