use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{with_bearer, ObjectStore};

/// Configuration for the Cloud Storage client
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// JSON API root (e.g. "https://storage.googleapis.com")
    pub api_url: String,
    /// Bearer token for upload and delete
    pub access_token: Option<String>,
    /// Endpoint that mints signed GET URLs
    pub signer_url: Option<String>,
}

impl StorageConfig {
    pub fn new(access_token: Option<String>, signer_url: Option<String>) -> Self {
        Self {
            api_url: "https://storage.googleapis.com".to_string(),
            access_token,
            signer_url,
        }
    }
}

/// Cloud Storage over the JSON API
pub struct GcsObjectStore {
    client: Client,
    config: StorageConfig,
}

impl GcsObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// API URL with each of `segments` percent-encoded as one path segment
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.api_url)
            .with_context(|| format!("Invalid storage API URL: {}", self.config.api_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Storage API URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn signed_url(&self, bucket: &str, object: &str, expiry: Duration) -> Result<String> {
        let signer_url = self
            .config
            .signer_url
            .as_deref()
            .context("URL_SIGNER_URL is not configured")?;

        let request = SignRequest {
            bucket,
            object,
            method: "GET",
            expires_in_secs: expiry.as_secs(),
        };
        let response = with_bearer(
            self.client.post(signer_url).json(&request),
            self.config.access_token.as_deref(),
        )
        .send()
        .await
        .context("Failed to reach URL signer")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("URL signer error: {} - {}", status, body);
        }

        let signed: SignResponse = response
            .json()
            .await
            .context("Failed to parse URL signer response")?;
        Ok(signed.url)
    }

    async fn upload(&self, bucket: &str, object: &str, file: &Path) -> Result<()> {
        let body = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {:?}", file))?;

        let mut url = self.api_url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object);

        let response = with_bearer(
            self.client
                .post(url)
                .header("content-type", "application/octet-stream")
                .body(body),
            self.config.access_token.as_deref(),
        )
        .send()
        .await
        .context("Failed to send upload request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Upload of gs://{}/{} failed: {} - {}", bucket, object, status, body);
        }

        info!("File {:?} uploaded to gs://{}/{}", file, bucket, object);
        Ok(())
    }

    async fn delete(&self, bucket: &str, object: &str) -> Result<()> {
        let url = self.api_url(&["storage", "v1", "b", bucket, "o", object])?;

        let response = with_bearer(self.client.delete(url), self.config.access_token.as_deref())
            .send()
            .await
            .context("Failed to send delete request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Delete of gs://{}/{} failed: {} - {}", bucket, object, status, body);
        }

        debug!("Object gs://{}/{} deleted", bucket, object);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    bucket: &'a str,
    object: &'a str,
    method: &'a str,
    expires_in_secs: u64,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(alias = "signed_url")]
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve;

    fn store(api_url: &str, signer_url: Option<String>) -> GcsObjectStore {
        GcsObjectStore::new(StorageConfig {
            api_url: api_url.to_string(),
            access_token: Some("token".to_string()),
            signer_url,
        })
    }

    #[test]
    fn test_object_names_are_single_segments() {
        let store = store("https://storage.googleapis.com/", None);
        let url = store
            .api_url(&["storage", "v1", "b", "bucket", "o", "temp/clip a.wav"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/bucket/o/temp%2Fclip%20a.wav"
        );
    }

    #[tokio::test]
    async fn test_signed_url_request() {
        let (base, mut requests) =
            serve(vec![(200, r#"{"url": "https://signed.example/x"}"#.to_string())]).await;
        let store = store("https://storage.googleapis.com", Some(format!("{}/sign", base)));

        let url = store
            .signed_url("bucket", "uploads/a.mp3", Duration::from_secs(900))
            .await
            .unwrap();
        assert_eq!(url, "https://signed.example/x");

        let request = requests.recv().await.unwrap();
        assert_eq!(
            request.json(),
            serde_json::json!({
                "bucket": "bucket",
                "object": "uploads/a.mp3",
                "method": "GET",
                "expires_in_secs": 900
            })
        );
    }

    #[tokio::test]
    async fn test_signed_url_requires_signer() {
        let store = store("https://storage.googleapis.com", None);
        let err = store
            .signed_url("bucket", "a.mp3", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("URL_SIGNER_URL"));
    }

    #[tokio::test]
    async fn test_upload_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.wav");
        std::fs::write(&clip, b"wav-bytes").unwrap();

        let (base, mut requests) =
            serve(vec![(200, "{}".to_string()), (204, String::new())]).await;
        let store = store(&base, None);

        store.upload("bucket", "temp/clip.wav", &clip).await.unwrap();
        store.delete("bucket", "temp/clip.wav").await.unwrap();

        let upload = requests.recv().await.unwrap();
        assert_eq!(upload.method, "POST");
        assert_eq!(
            upload.path,
            "/upload/storage/v1/b/bucket/o?uploadType=media&name=temp%2Fclip.wav"
        );
        assert_eq!(upload.body, b"wav-bytes");
        assert_eq!(upload.header("authorization"), Some("Bearer token"));

        let delete = requests.recv().await.unwrap();
        assert_eq!(delete.method, "DELETE");
        assert_eq!(delete.path, "/storage/v1/b/bucket/o/temp%2Fclip.wav");
    }
}
