// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Lineages, snapshots and diff results.

use crate::error::AppError;
use crate::models::record::{IdentityKey, Schema, WorkoutRecord};
use crate::models::version::VersionId;
use crate::storage::Generation;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_LINEAGE_LEN: usize = 128;

/// Identity grouping a sequence of snapshots from the same source.
///
/// Used verbatim as a path segment, so only `[A-Za-z0-9._-]` is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lineage(String);

impl Lineage {
    pub fn new(name: impl Into<String>) -> Result<Self, AppError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= MAX_LINEAGE_LEN
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(AppError::BadRequest(format!("Invalid lineage: {:?}", name)));
        }
        Ok(Self(name))
    }

    /// Derive the lineage from an object key's file stem:
    /// `uploads/user2632022_workout_history.csv` → `user2632022_workout_history`.
    ///
    /// Uploaded file names are not under our control, so characters outside
    /// the lineage alphabet become `_` (`my workouts.csv` → `my_workouts`).
    /// Distinct names can therefore share a lineage.
    pub fn from_object_key(key: &str) -> Result<Self, AppError> {
        let file_name = key.rsplit('/').next().unwrap_or(key);
        let stem = match file_name.rsplit_once('.') {
            Some((stem, _ext)) if !stem.is_empty() => stem,
            _ => file_name,
        };
        Self::new(sanitize_stem(stem))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn sanitize_stem(stem: &str) -> String {
    let mut name: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_LINEAGE_LEN)
        .collect();
    if name.starts_with('.') {
        name.replace_range(..1, "_");
    }
    name
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full record set of one lineage at a point in time.
///
/// A freshly parsed file has no version yet; snapshots loaded from the
/// repository carry the version they were archived under.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub lineage: Lineage,
    pub schema: Schema,
    pub records: Vec<WorkoutRecord>,
    pub version_id: Option<VersionId>,
    /// Archive location of this snapshot
    pub source_path: Option<String>,
    /// Storage generation of the current pointer when this snapshot was loaded
    pub generation: Option<Generation>,
}

impl Snapshot {
    pub fn new(lineage: Lineage, schema: Schema, records: Vec<WorkoutRecord>) -> Self {
        Self {
            lineage,
            schema,
            records,
            version_id: None,
            source_path: None,
            generation: None,
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &IdentityKey> {
        self.records.iter().map(WorkoutRecord::key)
    }
}

/// Records of an incoming snapshot that are absent from the prior one.
#[derive(Debug, Clone)]
pub struct DiffResult {
    /// In incoming file order
    pub new_records: Vec<WorkoutRecord>,
    pub total_incoming: usize,
    pub total_prior: usize,
}

impl DiffResult {
    pub fn new_record_count(&self) -> usize {
        self.new_records.len()
    }

    pub fn new_keys(&self) -> impl Iterator<Item = &IdentityKey> {
        self.new_records.iter().map(WorkoutRecord::key)
    }
}
