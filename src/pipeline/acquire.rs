//! Source acquisition: materialise the input archive inside the workspace.
//!
//! Two entry modes feed the same pipeline:
//!
//! * **Remote fetch**: the body of an HTTP(S) URL is streamed to disk chunk
//!   by chunk. Signed-URL query strings are ignored when naming the file.
//! * **Inline upload**: bytes already received by the HTTP layer are
//!   written verbatim.
//!
//! No retries: a failed acquisition ends the request.

use crate::error::ConvertError;
use crate::pipeline::workspace::{AssetStage, StagedAsset, Workspace};
use crate::request::{has_extension, redact_query, PlannedSource};
use futures::StreamExt;
use reqwest::Url;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Streams remote sources to disk. Cheap to clone; share one per process.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout_secs`
    /// (connection plus full body).
    pub fn new(timeout_secs: u64) -> Result<Self, ConvertError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ConvertError::Unexpected(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    /// Send a GET for `url` and return the response once its status is known
    /// to be a success. The body has not been read yet.
    pub async fn get(&self, url: &Url) -> Result<reqwest::Response, ConvertError> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/octet-stream")
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        if !response.status().is_success() {
            return Err(ConvertError::DownloadFailed {
                url: redact_query(url.as_str()),
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(response)
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    pub async fn fetch_to(&self, url: &Url, dest: &Path) -> Result<u64, ConvertError> {
        info!("Downloading source from: {}", redact_query(url.as_str()));
        let response = self.get(url).await?;

        let staging_err = |e: std::io::Error| ConvertError::StagingFailed {
            path: dest.to_path_buf(),
            source: e,
        };

        let mut file = tokio::fs::File::create(dest).await.map_err(staging_err)?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| self.request_error(url, e))?;
            file.write_all(&chunk).await.map_err(staging_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(staging_err)?;

        debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }

    fn request_error(&self, url: &Url, e: reqwest::Error) -> ConvertError {
        if e.is_timeout() {
            ConvertError::DownloadTimeout {
                url: redact_query(url.as_str()),
                secs: self.timeout_secs,
            }
        } else {
            ConvertError::DownloadFailed {
                url: redact_query(url.as_str()),
                reason: e.without_url().to_string(),
            }
        }
    }
}

/// Fills a workspace with the request's source.
#[derive(Debug, Clone)]
pub struct SourceAcquirer {
    fetcher: HttpFetcher,
    input_extension: String,
}

impl SourceAcquirer {
    pub fn new(fetcher: HttpFetcher, input_extension: impl Into<String>) -> Self {
        Self {
            fetcher,
            input_extension: input_extension.into(),
        }
    }

    /// Write the source into `workspace` and return it as the input asset.
    pub async fn acquire<'ws>(
        &self,
        workspace: &'ws Workspace,
        source: &PlannedSource,
    ) -> Result<StagedAsset<'ws>, ConvertError> {
        let filename = source.filename();
        if !has_extension(filename, &self.input_extension) {
            return Err(ConvertError::UnsupportedSource {
                filename: filename.to_string(),
                expected: self.input_extension.clone(),
            });
        }

        let input = workspace.stage(AssetStage::Input, filename);
        match source {
            PlannedSource::Remote { url, .. } => {
                self.fetcher.fetch_to(url, input.path()).await?;
            }
            PlannedSource::Inline { bytes, .. } => {
                tokio::fs::write(input.path(), bytes)
                    .await
                    .map_err(|e| ConvertError::StagingFailed {
                        path: input.path().to_path_buf(),
                        source: e,
                    })?;
                debug!("Wrote {} uploaded bytes to {}", bytes.len(), input.path().display());
            }
        }
        Ok(input)
    }
}
