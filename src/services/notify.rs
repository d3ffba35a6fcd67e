use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use super::Notifier;

/// Posts `{"firestore_ref": ...}` to a webhook when a job finishes
pub struct WebhookNotifier {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct NotificationPayload<'a> {
    firestore_ref: &'a str,
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, reference: &str) -> Result<()> {
        info!("Sending notification to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&NotificationPayload {
                firestore_ref: reference,
            })
            .send()
            .await
            .context("Failed to send notification")?;

        if !response.status().is_success() {
            anyhow::bail!("Notification endpoint returned {}", response.status());
        }

        info!("Notification sent ({})", response.status());
        Ok(())
    }
}
