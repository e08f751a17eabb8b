// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage adapters.
//!
//! Every backend exposes the same `ObjectStore` interface over `/`-separated
//! keys relative to its root, so no caller branches on where files live.

pub mod gcs;
pub mod local;
pub mod memory;

pub use gcs::GcsStore;
pub use local::LocalStore;
pub use memory::MemoryStore;

use crate::config::{Config, StorageMode};
use crate::error::StorageError;
use crate::services::google_token::GoogleTokenSource;
use async_trait::async_trait;
use std::sync::Arc;

/// Backend-assigned object version (Cloud Storage generation number).
pub type Generation = i64;

/// Object contents plus the generation they were read at, when the backend tracks one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub generation: Option<Generation>,
}

/// Precondition attached to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Unconditional replace.
    Overwrite,
    /// Create only; fails with `PreconditionFailed` if the object exists.
    IfAbsent,
    /// Replace only if the live object is still at this generation.
    IfGenerationMatch(Generation),
}

/// Uniform read/write/list over a backing store.
///
/// Calls reflect the backing store at call time; nothing is cached.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object. Missing objects yield `StorageError::NotFound`.
    async fn read(&self, path: &str) -> Result<StoredObject, StorageError>;

    /// Write an object, returning its new generation when the backend tracks one.
    async fn write(
        &self,
        path: &str,
        bytes: Vec<u8>,
        condition: WriteCondition,
    ) -> Result<Option<Generation>, StorageError>;

    /// All object keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Whether `WriteCondition::IfGenerationMatch` is honored.
    fn supports_compare_and_swap(&self) -> bool;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Reject keys that could escape the store root or are not plain relative keys.
pub fn validate_path(path: &str) -> Result<(), StorageError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.contains('\0')
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(StorageError::Unsupported(format!(
            "invalid object path {:?}",
            path
        )));
    }
    Ok(())
}

/// Build the store selected by configuration.
pub async fn build_store(
    config: &Config,
    http: reqwest::Client,
    tokens: Option<Arc<GoogleTokenSource>>,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    match &config.storage {
        StorageMode::Local { root } => {
            let store = LocalStore::new(root).await?;
            tracing::info!(root = %root.display(), "Using local storage");
            Ok(Arc::new(store))
        }
        StorageMode::Gcs { bucket } => {
            let store = match (&config.storage_emulator_host, tokens) {
                (Some(host), _) => {
                    tracing::info!(host = %host, "Using Cloud Storage emulator (unauthenticated)");
                    GcsStore::new(http, bucket, host, None)
                }
                (None, Some(tokens)) => {
                    GcsStore::new(http, bucket, gcs::DEFAULT_BASE_URL, Some(tokens))
                }
                (None, None) => {
                    return Err(StorageError::Unsupported(
                        "Cloud Storage requires Google credentials or STORAGE_EMULATOR_HOST"
                            .to_string(),
                    ));
                }
            };
            tracing::info!(bucket = %bucket, "Using Cloud Storage");
            Ok(Arc::new(store))
        }
    }
}
