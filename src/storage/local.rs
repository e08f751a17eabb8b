// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local directory-tree backend.
//!
//! Writes go to a temp file first. Overwrites publish it with `rename`,
//! create-only writes with `hard_link`, which fails atomically when the
//! target exists. There are no generation numbers, so compare-and-swap is
//! not available: concurrent writers of the same key race and the last
//! rename wins.

use super::{validate_path, Generation, ObjectStore, StoredObject, WriteCondition};
use crate::error::StorageError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

const TEMP_SUFFIX: &str = ".tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `root`, creating `current/` and `archive/`.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        for dir in ["current", "archive"] {
            let path = root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| StorageError::write(&path.display().to_string(), e))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        path.split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    fn temp_path_for(target: &Path) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{}{}", std::process::id(), n, TEMP_SUFFIX));
        target.with_file_name(name)
    }

    /// Write `bytes` to `temp` and publish it at `target`.
    async fn stage_and_publish(
        path: &str,
        temp: &Path,
        target: &Path,
        bytes: &[u8],
        condition: WriteCondition,
    ) -> Result<(), StorageError> {
        let mut file = tokio::fs::File::create(temp)
            .await
            .map_err(|e| StorageError::write(path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| StorageError::write(path, e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::write(path, e))?;
        drop(file);

        match condition {
            WriteCondition::IfAbsent => tokio::fs::hard_link(temp, target)
                .await
                .map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => StorageError::PreconditionFailed(path.to_string()),
                    _ => StorageError::write(path, e),
                }),
            _ => tokio::fs::rename(temp, target)
                .await
                .map_err(|e| StorageError::write(path, e)),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn read(&self, path: &str) -> Result<StoredObject, StorageError> {
        validate_path(path)?;
        match tokio::fs::read(self.full_path(path)).await {
            Ok(bytes) => Ok(StoredObject {
                bytes,
                generation: None,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(path.to_string())),
            Err(e) => Err(StorageError::read(path, e)),
        }
    }

    async fn write(
        &self,
        path: &str,
        bytes: Vec<u8>,
        condition: WriteCondition,
    ) -> Result<Option<Generation>, StorageError> {
        validate_path(path)?;
        if let WriteCondition::IfGenerationMatch(_) = condition {
            return Err(StorageError::Unsupported(
                "local storage has no generation preconditions".to_string(),
            ));
        }

        let target = self.full_path(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::write(path, e))?;
        }

        let temp = Self::temp_path_for(&target);
        let published = Self::stage_and_publish(path, &temp, &target, &bytes, condition).await;

        // Success or not, the temp file must not outlive this call. After a
        // rename it is already gone.
        if let Err(e) = tokio::fs::remove_file(&temp).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(temp = %temp.display(), error = %e, "Failed to remove temp file");
            }
        }

        published.map(|_| None)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // Start the walk at the deepest directory named by the prefix.
        let dir_part = prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            validate_path(dir_part)?;
            self.full_path(dir_part)
        };

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::read(prefix, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::read(prefix, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::read(prefix, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) && !key.ends_with(TEMP_SUFFIX) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn supports_compare_and_swap(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
