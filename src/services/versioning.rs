// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Versioning policy: new version ids and the persisted layout.
//!
//! Layout under the storage root:
//! - `archive/<lineage>/<version_id>.csv`: historical, immutable
//! - `current/<lineage>.csv`: latest promoted snapshot

use crate::models::{Lineage, VersionId};
use chrono::{DateTime, Utc};

pub const ARCHIVE_PREFIX: &str = "archive/";
pub const CURRENT_PREFIX: &str = "current/";
const SNAPSHOT_EXTENSION: &str = ".csv";

/// Next version id for a lineage whose newest archived version is `latest`.
///
/// Derived from `now` (UTC, second resolution). When that would not sort
/// strictly after `latest` (two ingests in one second, or a clock that went
/// backwards) the latest id is bumped instead.
pub fn next_version_id(latest: Option<&VersionId>, now: DateTime<Utc>) -> VersionId {
    let candidate = VersionId::at(now);
    match latest {
        Some(latest) if candidate <= *latest => latest.successor(),
        _ => candidate,
    }
}

pub fn archive_path(lineage: &Lineage, version_id: &VersionId) -> String {
    format!(
        "{}{}/{}{}",
        ARCHIVE_PREFIX, lineage, version_id, SNAPSHOT_EXTENSION
    )
}

pub fn archive_prefix(lineage: &Lineage) -> String {
    format!("{}{}/", ARCHIVE_PREFIX, lineage)
}

pub fn current_path(lineage: &Lineage) -> String {
    format!("{}{}{}", CURRENT_PREFIX, lineage, SNAPSHOT_EXTENSION)
}

/// Recover the version id from an archive key of `lineage`.
pub fn version_from_archive_path(lineage: &Lineage, path: &str) -> Option<VersionId> {
    path.strip_prefix(&archive_prefix(lineage))?
        .strip_suffix(SNAPSHOT_EXTENSION)?
        .parse()
        .ok()
}

/// Keys the service writes itself; arrivals there must not trigger ingestion.
pub fn is_managed_path(key: &str) -> bool {
    key.starts_with(ARCHIVE_PREFIX) || key.starts_with(CURRENT_PREFIX)
}
