//! Filesystem-backed store: `<root>/<bucket>/<key>`.
//!
//! Objects are written to a hidden sibling temp file and renamed into
//! place, so readers either see the previous object or the complete new one.

use super::{check_location, ObjectStore, StoreError, StoredObject};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A directory tree posing as a bucket store.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of `bucket/key`.
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.root.join(bucket), |path, seg| path.join(seg))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn url_for(&self, bucket: &str, key: &str) -> String {
        format!("file://{}", self.object_path(bucket, key).display())
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
    ) -> Result<StoredObject, StoreError> {
        check_location(bucket, key)?;

        let target = self.object_path(bucket, key);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_err(parent))?;
        }

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = target.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        let size_bytes = match tokio::fs::copy(source, &tmp).await {
            Ok(n) => n,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&tmp).await {
                    debug!("No partial temp file to remove at {}: {}", tmp.display(), rm);
                }
                return Err(StoreError::Io {
                    path: source.to_path_buf(),
                    source: e,
                });
            }
        };

        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            if let Err(rm) = tokio::fs::remove_file(&tmp).await {
                warn!("Failed to remove temp object {}: {}", tmp.display(), rm);
            }
            return Err(StoreError::Io {
                path: target,
                source: e,
            });
        }

        debug!("Stored {} bytes at {}", size_bytes, target.display());
        Ok(StoredObject {
            url: self.url_for(bucket, key),
            size_bytes,
        })
    }
}
