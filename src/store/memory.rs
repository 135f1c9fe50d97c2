//! In-memory store for tests and embedding.

use super::{check_location, ObjectStore, StoreError, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// A map of `(bucket, key) → bytes`.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Bytes>>,
    reject_writes: bool,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every write fails, for exercising publication errors.
    pub fn rejecting() -> Self {
        Self {
            reject_writes: true,
            ..Self::default()
        }
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// All stored `(bucket, key)` pairs, sorted.
    pub fn keys(&self) -> Vec<(String, String)> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Bytes>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn url_for(&self, bucket: &str, key: &str) -> String {
        format!("memory://{bucket}/{key}")
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
    ) -> Result<StoredObject, StoreError> {
        check_location(bucket, key)?;
        if self.reject_writes {
            return Err(StoreError::Rejected {
                status: 503,
                body: "store is read-only".to_string(),
            });
        }

        let data = tokio::fs::read(source).await.map_err(|e| StoreError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let size_bytes = data.len() as u64;
        self.lock()
            .insert((bucket.to_string(), key.to_string()), Bytes::from(data));

        Ok(StoredObject {
            url: self.url_for(bucket, key),
            size_bytes,
        })
    }
}
