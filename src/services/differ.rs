// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Record differ: which incoming rows are new relative to the prior snapshot.

use crate::models::{DiffResult, IdentityKey, Snapshot};
use std::collections::HashSet;

/// Compute the records of `incoming` whose identity key is absent from `prior`.
///
/// With no prior snapshot every incoming record is new. Output keeps the
/// incoming file order. Rows sharing a key inside the incoming file are
/// each checked against the prior set only, so an unseen duplicate is
/// reported once per occurrence.
pub fn diff(prior: Option<&Snapshot>, incoming: &Snapshot) -> DiffResult {
    let known: HashSet<&IdentityKey> = prior.map(|p| p.keys().collect()).unwrap_or_default();

    let new_records = incoming
        .records
        .iter()
        .filter(|record| !known.contains(record.key()))
        .cloned()
        .collect();

    DiffResult {
        new_records,
        total_incoming: incoming.record_count(),
        total_prior: prior.map_or(0, Snapshot::record_count),
    }
}
