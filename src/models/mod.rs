// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the ingestion pipeline.

pub mod event;
pub mod record;
pub mod snapshot;
pub mod version;

pub use event::IngestEvent;
pub use record::{IdentityKey, Schema, WorkoutRecord};
pub use snapshot::{DiffResult, Lineage, Snapshot};
pub use version::VersionId;
