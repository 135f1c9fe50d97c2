//! Publication: copy the finished GLB to its destination store.

use crate::error::ConvertError;
use crate::outcome::Published;
use crate::pipeline::workspace::{AssetStage, StagedAsset};
use crate::request::Destination;
use crate::store::ObjectStore;
use std::sync::Arc;
use tracing::info;

/// Hands output assets to the injected [`ObjectStore`].
#[derive(Clone)]
pub struct ResultPublisher {
    store: Arc<dyn ObjectStore>,
}

impl ResultPublisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Publish `output` to `destination`. On error nothing is published.
    pub async fn publish(
        &self,
        output: &StagedAsset<'_>,
        destination: &Destination,
    ) -> Result<Published, ConvertError> {
        if output.stage() != AssetStage::Output {
            return Err(ConvertError::Unexpected(format!(
                "refusing to publish a {:?} asset",
                output.stage()
            )));
        }

        let stored = self
            .store
            .put_file(&destination.bucket, &destination.path, output.path())
            .await
            .map_err(|e| ConvertError::PublicationFailed {
                bucket: destination.bucket.clone(),
                path: destination.path.clone(),
                source: e,
            })?;

        info!(
            "Published {} bytes to {} via {} store",
            stored.size_bytes,
            destination,
            self.store.name()
        );

        Ok(Published {
            bucket: destination.bucket.clone(),
            path: destination.path.clone(),
            url: stored.url,
            size_bytes: stored.size_bytes,
        })
    }
}
