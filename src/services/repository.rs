// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Snapshot repository: the current pointer and the archive of every lineage.
//!
//! Promotion writes the archive copy first (create-only), then moves the
//! current pointer. If the pointer update fails the archive copy stays
//! in place, so a failed promotion never loses data, though it may need
//! a manual re-promotion.

use crate::error::{AppError, Result, StorageError};
use crate::models::{Lineage, Snapshot, VersionId};
use crate::services::csv_codec::{encode_snapshot, parse_snapshot};
use crate::services::versioning::{
    archive_path, archive_prefix, current_path, next_version_id, version_from_archive_path,
};
use crate::storage::{Generation, ObjectStore, WriteCondition};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Attempts at claiming an unused archive slot before giving up.
const MAX_ARCHIVE_ATTEMPTS: usize = 3;

/// Archived versions compared against the current bytes to identify its version.
const MAX_VERSION_PROBES: usize = 5;

/// What the caller saw at the current pointer when it loaded the prior snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentExpectation {
    /// No current snapshot existed.
    Absent,
    /// The current pointer was at this generation.
    Generation(Generation),
    /// The backend does not report generations.
    Unchecked,
}

impl CurrentExpectation {
    pub fn from_prior(prior: Option<&Snapshot>) -> Self {
        match prior {
            None => CurrentExpectation::Absent,
            Some(snapshot) => snapshot
                .generation
                .map_or(CurrentExpectation::Unchecked, CurrentExpectation::Generation),
        }
    }
}

/// Result of a successful promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub version_id: VersionId,
    pub archive_path: String,
    pub record_count: usize,
}

#[derive(Clone)]
pub struct SnapshotRepository {
    store: Arc<dyn ObjectStore>,
}

impl SnapshotRepository {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Load the current snapshot of a lineage, or `None` for a new lineage.
    pub async fn get_current(&self, lineage: &Lineage) -> Result<Option<Snapshot>> {
        let path = current_path(lineage);
        let object = match self.store.read(&path).await {
            Ok(object) => object,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut snapshot = parse_snapshot(lineage.clone(), &object.bytes).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Corrupt current snapshot {}: {}", path, e))
        })?;
        snapshot.generation = object.generation;
        snapshot.version_id = self.identify_version(lineage, &object.bytes).await?;
        snapshot.source_path = snapshot.version_id.map(|v| archive_path(lineage, &v));

        tracing::debug!(
            lineage = %lineage,
            version_id = ?snapshot.version_id,
            records = snapshot.record_count(),
            "Loaded current snapshot"
        );
        Ok(Some(snapshot))
    }

    /// All archived version ids of a lineage, oldest first.
    pub async fn history(&self, lineage: &Lineage) -> Result<Vec<VersionId>> {
        let keys = self.store.list(&archive_prefix(lineage)).await?;
        let mut versions: Vec<VersionId> = keys
            .iter()
            .filter_map(|key| version_from_archive_path(lineage, key))
            .collect();
        versions.sort();
        Ok(versions)
    }

    pub async fn latest_version(&self, lineage: &Lineage) -> Result<Option<VersionId>> {
        Ok(self.history(lineage).await?.pop())
    }

    /// Load an archived snapshot.
    pub async fn read_version(&self, lineage: &Lineage, version_id: &VersionId) -> Result<Snapshot> {
        let path = archive_path(lineage, version_id);
        let object = self.store.read(&path).await?;
        let mut snapshot = parse_snapshot(lineage.clone(), &object.bytes)?;
        snapshot.version_id = Some(*version_id);
        snapshot.source_path = Some(path);
        Ok(snapshot)
    }

    /// Version id for a new snapshot of `lineage`, strictly after every archived one.
    pub async fn next_version_id(&self, lineage: &Lineage, now: DateTime<Utc>) -> Result<VersionId> {
        let latest = self.latest_version(lineage).await?;
        Ok(next_version_id(latest.as_ref(), now))
    }

    /// Archive `snapshot` under `version_id`, then point current at it.
    ///
    /// If another writer already archived that id, the next free id is used;
    /// the returned promotion carries the id actually written.
    pub async fn archive_and_promote(
        &self,
        lineage: &Lineage,
        snapshot: &Snapshot,
        version_id: VersionId,
        expected: CurrentExpectation,
    ) -> Result<Promotion> {
        let bytes = encode_snapshot(snapshot)?;

        let mut version_id = version_id;
        let mut attempt = 1;
        let archived = loop {
            let path = archive_path(lineage, &version_id);
            match self
                .store
                .write(&path, bytes.clone(), WriteCondition::IfAbsent)
                .await
            {
                Ok(_) => break path,
                Err(StorageError::PreconditionFailed(_)) if attempt < MAX_ARCHIVE_ATTEMPTS => {
                    tracing::warn!(
                        lineage = %lineage,
                        version_id = %version_id,
                        "Archive slot already taken, trying next version id"
                    );
                    version_id = version_id.successor();
                    attempt += 1;
                }
                Err(StorageError::PreconditionFailed(_)) => {
                    return Err(AppError::Conflict(format!(
                        "No free archive slot for {} after {} attempts",
                        lineage, MAX_ARCHIVE_ATTEMPTS
                    )));
                }
                Err(e) => {
                    return Err(AppError::WriteFailure(format!(
                        "Archive write for {} failed: {}",
                        lineage, e
                    )))
                }
            }
        };

        tracing::info!(
            lineage = %lineage,
            version_id = %version_id,
            path = %archived,
            "Snapshot archived"
        );

        let condition = match expected {
            CurrentExpectation::Absent => WriteCondition::IfAbsent,
            CurrentExpectation::Generation(g) if self.store.supports_compare_and_swap() => {
                WriteCondition::IfGenerationMatch(g)
            }
            _ => WriteCondition::Overwrite,
        };

        let current = current_path(lineage);
        if let Err(e) = self.store.write(&current, bytes, condition).await {
            tracing::error!(
                lineage = %lineage,
                version_id = %version_id,
                archive_path = %archived,
                error = %e,
                "Current pointer update failed; archived copy retained for recovery"
            );
            return Err(match e {
                StorageError::PreconditionFailed(_) => AppError::Conflict(format!(
                    "{} changed since it was loaded; archived copy at {}",
                    current, archived
                )),
                other => AppError::WriteFailure(format!(
                    "Promote of {} failed ({}); archived copy at {}",
                    lineage, other, archived
                )),
            });
        }

        tracing::info!(
            lineage = %lineage,
            version_id = %version_id,
            records = snapshot.record_count(),
            "Snapshot promoted to current"
        );

        Ok(Promotion {
            version_id,
            archive_path: archived,
            record_count: snapshot.record_count(),
        })
    }

    /// Find which archived version the current bytes are a copy of.
    ///
    /// Checks the newest archived versions only; normally the newest one
    /// matches, or its predecessor when the last promotion failed halfway.
    async fn identify_version(&self, lineage: &Lineage, current: &[u8]) -> Result<Option<VersionId>> {
        let history = self.history(lineage).await?;
        for version_id in history.iter().rev().take(MAX_VERSION_PROBES) {
            match self.store.read(&archive_path(lineage, version_id)).await {
                Ok(object) if object.bytes == current => return Ok(Some(*version_id)),
                Ok(_) | Err(StorageError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if !history.is_empty() {
            tracing::warn!(
                lineage = %lineage,
                archived = history.len(),
                "Current snapshot matches no recent archived version"
            );
        }
        Ok(None)
    }
}
