//! Google Cloud Storage backend using the JSON API's single-request media
//! upload (`uploadType=media`).
//!
//! GCS only makes an object visible once the upload request has completed,
//! which gives us the all-or-nothing publish the pipeline needs. The file is
//! streamed from disk, never buffered whole in memory.
//!
//! Credentials are ambient: pass an OAuth2 access token (for example from
//! `gcloud auth print-access-token` or the metadata server). Leave it unset
//! when talking to an emulator such as fake-gcs-server.

use super::{check_location, content_type_for, ObjectStore, StoreError, StoredObject};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Url;
use std::path::Path;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// Public GCS endpoint.
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Uploads objects to Google Cloud Storage.
#[derive(Clone)]
pub struct GcsObjectStore {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
}

impl std::fmt::Debug for GcsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsObjectStore")
            .field("endpoint", &self.endpoint)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl GcsObjectStore {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// `POST {endpoint}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={key}`
    fn upload_url(&self, bucket: &str, key: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| StoreError::Request(format!("invalid endpoint '{}': {e}", self.endpoint)))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Request(format!("endpoint '{}' cannot be a base", self.endpoint)))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn name(&self) -> &'static str {
        "gcs"
    }

    fn url_for(&self, bucket: &str, key: &str) -> String {
        format!("gs://{bucket}/{key}")
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
    ) -> Result<StoredObject, StoreError> {
        check_location(bucket, key)?;
        let url = self.upload_url(bucket, key)?;

        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| StoreError::Io {
                path: source.to_path_buf(),
                source: e,
            })?;
        let size_bytes = file
            .metadata()
            .await
            .map_err(|e| StoreError::Io {
                path: source.to_path_buf(),
                source: e,
            })?
            .len();

        info!("Uploading {} bytes to gs://{}/{}", size_bytes, bucket, key);

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type_for(key))
            .header(CONTENT_LENGTH, size_bytes)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)));
        if let Some(ref token) = self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(512).collect();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("GCS accepted gs://{}/{} ({})", bucket, key, status);
        Ok(StoredObject {
            url: self.url_for(bucket, key),
            size_bytes,
        })
    }
}
