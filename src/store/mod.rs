//! Durable object stores that receive converted assets.
//!
//! The pipeline only ever talks to an [`ObjectStore`] trait object, injected
//! when the [`crate::ConversionService`] is built. Three backends ship with
//! the crate:
//!
//! * [`LocalObjectStore`]: a directory tree, `<root>/<bucket>/<key>`.
//! * [`GcsObjectStore`]: Google Cloud Storage JSON API media uploads.
//! * [`InMemoryObjectStore`]: a map, for tests and embedding.
//!
//! Every backend must publish atomically: a failed or interrupted
//! `put_file` leaves no object (old or partial) that a reader could mistake
//! for the result.

mod gcs;
mod local;
mod memory;

pub use gcs::{GcsObjectStore, DEFAULT_GCS_ENDPOINT};
pub use local::LocalObjectStore;
pub use memory::InMemoryObjectStore;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading the source file or writing the local object failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store could not be reached.
    #[error("store request failed: {0}")]
    Request(String),

    /// The store answered with a non-success status.
    #[error("store rejected the upload with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The key would escape the bucket or is otherwise unusable.
    #[error("invalid object key '{0}'")]
    InvalidKey(String),
}

/// Metadata about an object that was just written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
    pub size_bytes: u64,
}

/// A durable blob store. Implementations must be safe to share between
/// concurrent requests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// The locator a reader would use for `bucket/key`.
    fn url_for(&self, bucket: &str, key: &str) -> String;

    /// Copy the file at `source` to `bucket/key`, replacing any existing
    /// object only once the new one is complete.
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
    ) -> Result<StoredObject, StoreError>;
}

/// MIME type for an object key, by extension.
pub(crate) fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("glb") => "model/gltf-binary",
        Some("gltf") => "model/gltf+json",
        Some("usdz") => "model/vnd.usdz+zip",
        _ => "application/octet-stream",
    }
}

/// Why `key` cannot address exactly one object, if it cannot.
///
/// Shared by request validation and every backend so that a destination the
/// pipeline accepts is never refused at publication time.
pub(crate) fn key_problem(key: &str) -> Option<&'static str> {
    if key.trim().is_empty() {
        Some("path is empty")
    } else if key.starts_with('/') || key.ends_with('/') {
        Some("path must name an object, not a directory")
    } else if key.contains('\\') {
        Some("path must not contain '\\'")
    } else if key
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        Some("path contains empty or relative segments")
    } else {
        None
    }
}

/// Why `bucket` is not a usable bucket name, if it is not.
pub(crate) fn bucket_problem(bucket: &str) -> Option<&'static str> {
    if bucket.trim().is_empty() {
        Some("bucket is empty")
    } else if bucket.contains(['/', '\\']) {
        Some("bucket name must not contain '/' or '\\'")
    } else if bucket == "." || bucket == ".." {
        Some("bucket name must not be '.' or '..'")
    } else {
        None
    }
}

/// Reject locations that could address something other than one object.
pub(crate) fn check_location(bucket: &str, key: &str) -> Result<(), StoreError> {
    if bucket_problem(bucket).is_some() || key_problem(key).is_some() {
        Err(StoreError::InvalidKey(format!("{bucket}/{key}")))
    } else {
        Ok(())
    }
}
