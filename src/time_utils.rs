// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Clocks and timestamp formatting shared by versioning and notifications.

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

/// Source of "now" for version ids and notification timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The wall clock.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// A clock frozen at `at`, for replaying an ingestion deterministically.
pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}

/// Format a UTC timestamp as RFC3339 with whole seconds and a `Z` suffix,
/// the form notifications carry.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}
