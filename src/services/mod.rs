// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod csv_codec;
pub mod differ;
pub mod google_token;
pub mod notifier;
pub mod pipeline;
pub mod repository;
pub mod versioning;

pub use google_token::GoogleTokenSource;
pub use notifier::{LogNotifier, Notification, Notifier, PubSubNotifier};
pub use pipeline::{IngestOutcome, Pipeline, TerminalState};
pub use repository::{CurrentExpectation, Promotion, SnapshotRepository};
