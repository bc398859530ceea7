// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A single persisted collection backed by one JSON file.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use ovhsnap_core::SnapError;

/// One named collection persisted as `{"<key>": [entities...]}`.
///
/// All reads go through a shared lock over the in-memory snapshot; all
/// writes go through [`Collection::mutate`], which applies the change to a
/// copy, atomically replaces the file (write-temp-then-rename), and only
/// then commits the copy to memory. A failed write therefore leaves the
/// in-memory state untouched.
#[derive(Debug)]
pub struct Collection<T> {
    path: PathBuf,
    key: &'static str,
    items: RwLock<Vec<T>>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Open a collection, loading the existing file if present.
    ///
    /// A missing file is an empty collection (first run). A file that exists
    /// but cannot be parsed fails closed with [`SnapError::CorruptState`];
    /// the operator must restore or remove it.
    pub async fn open(path: impl Into<PathBuf>, key: &'static str) -> Result<Self, SnapError> {
        let path = path.into();
        let items = match tokio::fs::read(&path).await {
            Ok(bytes) => Self::parse_envelope(&path, key, &bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), key, "state file absent, starting empty");
                Vec::new()
            }
            Err(e) => {
                return Err(SnapError::Store {
                    source: Box::new(e),
                })
            }
        };
        Ok(Self {
            path,
            key,
            items: RwLock::new(items),
        })
    }

    fn parse_envelope(path: &Path, key: &str, bytes: &[u8]) -> Result<Vec<T>, SnapError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| SnapError::CorruptState {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let Some(list) = value.get(key) else {
            return Err(SnapError::CorruptState {
                path: path.display().to_string(),
                message: format!("missing \"{key}\" key"),
            });
        };
        serde_json::from_value(list.clone()).map_err(|e| SnapError::CorruptState {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Snapshot of the whole collection.
    pub async fn load(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    /// Number of entities currently in the collection.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// True when the collection holds no entities.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Read/modify/write under the exclusive lock.
    ///
    /// `f` receives a copy of the snapshot; returning an error aborts the
    /// mutation with neither the file nor memory changed.
    pub async fn mutate<R, F>(&self, f: F) -> Result<R, SnapError>
    where
        F: FnOnce(&mut Vec<T>) -> Result<R, SnapError>,
    {
        let mut guard = self.items.write().await;
        let mut copy = guard.clone();
        let out = f(&mut copy)?;
        self.persist(&copy).await?;
        *guard = copy;
        Ok(out)
    }

    /// Serialize and atomically replace the backing file.
    async fn persist(&self, items: &[T]) -> Result<(), SnapError> {
        let list = serde_json::to_value(items).map_err(|e| SnapError::Store {
            source: Box::new(e),
        })?;
        let mut envelope = serde_json::Map::new();
        envelope.insert(self.key.to_string(), list);
        let bytes =
            serde_json::to_vec_pretty(&envelope).map_err(|e| SnapError::Store {
                source: Box::new(e),
            })?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| SnapError::Store {
                source: Box::new(e),
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SnapError::Store {
                source: Box::new(e),
            })
    }
}
