use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::{MediaFetcher, ObjectStore};
use crate::error::{PipelineError, Result};
use crate::models::MediaLocator;

/// Downloads media over HTTP, signing object-store locators first
pub struct HttpMediaFetcher {
    client: Client,
    object_store: Option<Arc<dyn ObjectStore>>,
    signed_url_expiry: Duration,
}

impl HttpMediaFetcher {
    pub fn new(object_store: Option<Arc<dyn ObjectStore>>, signed_url_expiry: Duration) -> Self {
        Self {
            client: Client::new(),
            object_store,
            signed_url_expiry,
        }
    }

    async fn download_url(&self, locator: &MediaLocator) -> Result<String> {
        match locator {
            MediaLocator::Url(url) => Ok(url.clone()),
            MediaLocator::Object { bucket, path } => {
                let store = self.object_store.as_ref().ok_or_else(|| {
                    PipelineError::fetch(format!("No object store configured for {}", locator))
                })?;
                debug!(
                    "Requesting signed URL for {} valid for {:?}",
                    locator, self.signed_url_expiry
                );
                store
                    .signed_url(bucket, path, self.signed_url_expiry)
                    .await
                    .map_err(|e| PipelineError::fetch(format!("Failed to sign {}: {:#}", locator, e)))
            }
        }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, locator: &MediaLocator) -> Result<Vec<u8>> {
        let url = self.download_url(locator).await?;
        info!("Downloading media from {}", locator);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::fetch(format!("Request for {} failed: {}", locator, e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(format!(
                "Download of {} returned {}",
                locator, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::fetch(format!("Failed to read body of {}: {}", locator, e.without_url())))?;

        info!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}
