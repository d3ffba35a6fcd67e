use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{with_bearer, Diarizer};
use crate::error::{PipelineError, Result};
use crate::models::SpeakerTurn;

/// Configuration for the diarization service client
#[derive(Debug, Clone)]
pub struct DiarizationConfig {
    /// Endpoint receiving a WAV body and returning speaker turns
    pub url: String,
    /// Bearer token (e.g. a Hugging Face token)
    pub token: Option<String>,
}

/// Diarizes audio by posting it to a diarization service
pub struct HttpDiarizer {
    client: Client,
    config: DiarizationConfig,
}

impl HttpDiarizer {
    pub fn new(config: DiarizationConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Diarizer for HttpDiarizer {
    async fn diarize(&self, audio: &Path) -> Result<Vec<SpeakerTurn>> {
        let body = tokio::fs::read(audio).await.map_err(|e| {
            PipelineError::diarization(format!("Failed to read {:?}: {}", audio, e))
        })?;

        info!("Submitting {} bytes for diarization", body.len());
        let request = self
            .client
            .post(&self.config.url)
            .header("content-type", "audio/wav")
            .body(body);

        let response = with_bearer(request, self.config.token.as_deref())
            .send()
            .await
            .map_err(|e| PipelineError::diarization(format!("Diarization request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::diarization(format!(
                "Diarization service error: {} - {}",
                status, body
            )));
        }

        let parsed: DiarizationResponse = response.json().await.map_err(|e| {
            PipelineError::diarization(format!("Failed to parse diarization response: {}", e))
        })?;

        let turns = parsed.into_turns();
        info!("Diarization returned {} turns", turns.len());
        Ok(turns)
    }
}

/// Accepts either `{"turns": [...]}` or a bare array of turns
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DiarizationResponse {
    Wrapped { turns: Vec<SpeakerTurn> },
    Bare(Vec<SpeakerTurn>),
}

impl DiarizationResponse {
    fn into_turns(self) -> Vec<SpeakerTurn> {
        match self {
            DiarizationResponse::Wrapped { turns } | DiarizationResponse::Bare(turns) => turns,
        }
    }
}
