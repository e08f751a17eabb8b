// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ingestion pipeline, invoked once per arriving file.
//!
//! Handles the core workflow:
//! 1. Resolve the file key and lineage from the trigger event
//! 2. Read and parse the file
//! 3. Load the lineage's current snapshot (absent on first ingestion)
//! 4. Diff incoming against current
//! 5. Version, archive and promote the incoming snapshot
//! 6. Notify (best-effort)

use crate::error::{AppError, Result};
use crate::models::{DiffResult, IdentityKey, IngestEvent, Lineage, VersionId};
use crate::services::csv_codec::parse_snapshot;
use crate::services::differ::diff;
use crate::services::notifier::{Notification, Notifier};
use crate::services::repository::{CurrentExpectation, Promotion, SnapshotRepository};
use crate::services::versioning::is_managed_path;
use crate::storage::ObjectStore;
pub use crate::time_utils::Clock;
use crate::time_utils::{format_utc_rfc3339, system_clock};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Per-lineage locks: one promotion per lineage at a time within this process.
/// An entry lives only while some invocation holds or waits on it.
pub type LineageLocks = Arc<DashMap<Lineage, Arc<Mutex<()>>>>;

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// Persisted and notified.
    Completed,
    /// Persisted; the notification could not be published.
    CompletedNotifyFailed,
    /// Parse or persist failure; surfaced to the caller as an error.
    Aborted,
    /// The key is one of the service's own outputs.
    Ignored,
}

impl TerminalState {
    pub fn of(result: &Result<IngestOutcome>) -> Self {
        match result {
            Ok(outcome) => outcome.state,
            Err(_) => TerminalState::Aborted,
        }
    }
}

/// Result of a completed (or ignored) invocation.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub state: TerminalState,
    pub file_key: String,
    pub lineage: Option<Lineage>,
    pub version_id: Option<VersionId>,
    pub archive_path: Option<String>,
    pub new_record_count: usize,
    pub total_incoming: usize,
    pub total_prior: usize,
    pub new_record_keys: Vec<IdentityKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_error: Option<String>,
}

impl IngestOutcome {
    fn ignored(file_key: &str) -> Self {
        Self {
            state: TerminalState::Ignored,
            file_key: file_key.to_string(),
            lineage: None,
            version_id: None,
            archive_path: None,
            new_record_count: 0,
            total_incoming: 0,
            total_prior: 0,
            new_record_keys: Vec::new(),
            notify_error: None,
        }
    }
}

/// What a successful locked section produced.
struct Persisted {
    result: DiffResult,
    promotion: Promotion,
    at: DateTime<Utc>,
}

/// Sequences one ingestion end-to-end against injected storage and notifier.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    repository: SnapshotRepository,
    notifier: Arc<dyn Notifier>,
    locks: LineageLocks,
    clock: Clock,
    max_summary_records: usize,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        max_summary_records: usize,
    ) -> Self {
        Self {
            repository: SnapshotRepository::new(store.clone()),
            store,
            notifier,
            locks: Arc::new(DashMap::new()),
            clock: system_clock(),
            max_summary_records,
        }
    }

    /// Replace the wall clock (tests).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn repository(&self) -> &SnapshotRepository {
        &self.repository
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Number of lineages with an invocation in flight.
    pub fn active_lineage_locks(&self) -> usize {
        self.locks.len()
    }

    /// Process one arriving file.
    ///
    /// Parse and persist failures come back as `Err` (terminal state
    /// `Aborted`) so the trigger can retry or alert. A failed notification
    /// only downgrades the outcome to `CompletedNotifyFailed`.
    pub async fn process(&self, event: &IngestEvent) -> Result<IngestOutcome> {
        let file_key = event.object_key.trim();

        // 1. Receive
        if is_managed_path(file_key) {
            tracing::debug!(file_key, "Ignoring write to managed path");
            return Ok(IngestOutcome::ignored(file_key));
        }
        let lineage = match &event.lineage {
            Some(name) => Lineage::new(name.clone())?,
            None => Lineage::from_object_key(file_key)?,
        };
        tracing::info!(file_key, lineage = %lineage, "Processing file");

        let lock = self.lock_for(&lineage);
        let persisted = {
            let _guard = lock.lock().await;
            self.persist(file_key, &lineage).await
        };
        drop(lock);
        self.release_lock(&lineage);
        let Persisted {
            result,
            promotion,
            at,
        } = persisted?;

        // 6. Notify
        let new_record_keys: Vec<IdentityKey> = result.new_keys().cloned().collect();
        let summary_len = new_record_keys.len().min(self.max_summary_records);
        let notification = Notification {
            lineage: lineage.to_string(),
            version_id: promotion.version_id.to_string(),
            new_record_count: result.new_record_count(),
            timestamp: format_utc_rfc3339(at),
            source_key: file_key.to_string(),
            total_incoming: result.total_incoming,
            total_prior: result.total_prior,
            new_record_keys: new_record_keys[..summary_len]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            keys_truncated: summary_len < new_record_keys.len(),
        };

        let notify_error = match self.notifier.publish(&notification).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    lineage = %lineage,
                    version_id = %promotion.version_id,
                    notifier = %self.notifier.describe(),
                    error = %e,
                    "Failed to publish notification; snapshot already persisted"
                );
                Some(e.to_string())
            }
        };

        let state = if notify_error.is_none() {
            TerminalState::Completed
        } else {
            TerminalState::CompletedNotifyFailed
        };

        tracing::info!(
            lineage = %lineage,
            version_id = %promotion.version_id,
            new_records = result.new_record_count(),
            state = ?state,
            "Ingestion finished"
        );

        Ok(IngestOutcome {
            state,
            file_key: file_key.to_string(),
            lineage: Some(lineage),
            version_id: Some(promotion.version_id),
            archive_path: Some(promotion.archive_path),
            new_record_count: result.new_record_count(),
            total_incoming: result.total_incoming,
            total_prior: result.total_prior,
            new_record_keys,
            notify_error,
        })
    }

    /// Steps 2 to 5, run while holding the lineage lock.
    async fn persist(&self, file_key: &str, lineage: &Lineage) -> Result<Persisted> {
        // 2. Parse
        let raw = self.store.read(file_key).await.map_err(AppError::from)?;
        let incoming = parse_snapshot(lineage.clone(), &raw.bytes).map_err(|e| {
            tracing::error!(file_key, lineage = %lineage, error = %e, "Rejected malformed file");
            e
        })?;

        // 3. Load prior
        let prior = self.repository.get_current(lineage).await?;

        // 4. Diff
        let result = diff(prior.as_ref(), &incoming);
        tracing::info!(
            lineage = %lineage,
            prior_version = ?prior.as_ref().and_then(|p| p.version_id),
            incoming = result.total_incoming,
            prior = result.total_prior,
            new_records = result.new_record_count(),
            "Diff computed"
        );

        // 5. Version & persist
        let at = (self.clock)();
        let version_id = self.repository.next_version_id(lineage, at).await?;
        let promotion = self
            .repository
            .archive_and_promote(
                lineage,
                &incoming,
                version_id,
                CurrentExpectation::from_prior(prior.as_ref()),
            )
            .await?;

        Ok(Persisted {
            result,
            promotion,
            at,
        })
    }

    fn lock_for(&self, lineage: &Lineage) -> Arc<Mutex<()>> {
        self.locks
            .entry(lineage.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lineage's lock entry once no other invocation holds a handle to it.
    fn release_lock(&self, lineage: &Lineage) {
        self.locks
            .remove_if(lineage, |_, lock| Arc::strong_count(lock) == 1);
    }
}
