// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process backend with generation numbers and injectable write failures.
//!
//! Behaves like Cloud Storage for preconditions, which makes it the
//! backend of choice for exercising the pipeline offline.

use super::{validate_path, Generation, ObjectStore, StoredObject, WriteCondition};
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, (Vec<u8>, Generation)>,
    last_generation: Generation,
    /// Writes to keys under these prefixes fail.
    failing_prefixes: Vec<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every write under `prefix` fail with `WriteFailure`.
    pub fn fail_writes_under(&self, prefix: impl Into<String>) {
        self.lock().failing_prefixes.push(prefix.into());
    }

    pub fn clear_failures(&self) {
        self.lock().failing_prefixes.clear();
    }

    /// Current bytes of an object, bypassing the trait.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(path).map(|(bytes, _)| bytes.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<StoredObject, StorageError> {
        validate_path(path)?;
        self.lock()
            .objects
            .get(path)
            .map(|(bytes, generation)| StoredObject {
                bytes: bytes.clone(),
                generation: Some(*generation),
            })
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn write(
        &self,
        path: &str,
        bytes: Vec<u8>,
        condition: WriteCondition,
    ) -> Result<Option<Generation>, StorageError> {
        validate_path(path)?;
        let mut inner = self.lock();

        if inner.failing_prefixes.iter().any(|p| path.starts_with(p)) {
            return Err(StorageError::write(path, "injected failure"));
        }

        let live = inner.objects.get(path).map(|(_, generation)| *generation);
        let allowed = match condition {
            WriteCondition::Overwrite => true,
            WriteCondition::IfAbsent => live.is_none(),
            WriteCondition::IfGenerationMatch(expected) => live == Some(expected),
        };
        if !allowed {
            return Err(StorageError::PreconditionFailed(path.to_string()));
        }

        inner.last_generation += 1;
        let generation = inner.last_generation;
        inner.objects.insert(path.to_string(), (bytes, generation));
        Ok(Some(generation))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .lock()
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn supports_compare_and_swap(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
