// SPDX-FileCopyrightText: 2026 Threadline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local directory object store: `<root>/<bucket>/<key>`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use threadline_core::{ObjectStore, ThreadlineError};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key below the root. Keys may contain `/` but must stay
    /// inside their bucket.
    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf, ThreadlineError> {
        let escapes = Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes || bucket.contains(['/', '\\']) {
            return Err(ThreadlineError::ObjectStore {
                key: format!("{bucket}/{key}"),
                source: "object key must be a relative path inside the bucket".into(),
            });
        }
        Ok(self.root.join(bucket).join(key))
    }

    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool, ThreadlineError> {
        let path = self.resolve(bucket, key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| ThreadlineError::ObjectStore {
                key: format!("{bucket}/{key}"),
                source: Box::new(e),
            })
    }

    pub async fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), ThreadlineError> {
        let path = self.resolve(bucket, key)?;
        let io_err = |e: std::io::Error| ThreadlineError::ObjectStore {
            key: format!("{bucket}/{key}"),
            source: Box::new(e),
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(io_err)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ThreadlineError> {
        let path = self.resolve(bucket, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| ThreadlineError::ObjectStore {
                key: format!("{bucket}/{key}"),
                source: Box::new(e),
            })
    }
}
