use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{with_bearer, ObjectStore, Recognizer};
use crate::audio::{wav_duration, TARGET_SAMPLE_RATE};
use crate::error::{PipelineError, Result};

/// Object prefix for clips staged for long-running recognition
const STAGING_PREFIX: &str = "temp_transcription_segments";

/// Configuration for the Speech-to-Text client
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// REST root, e.g. "https://speech.googleapis.com/v1"
    pub api_url: String,
    pub access_token: Option<String>,
    /// Bucket used to stage long clips
    pub staging_bucket: Option<String>,
    /// Clips at or above this length go through long-running recognition
    pub long_form_threshold: Duration,
    /// Upper bound for one long-running operation
    pub long_form_timeout: Duration,
    /// Delay between operation polls
    pub poll_interval: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_url: "https://speech.googleapis.com/v1".to_string(),
            access_token: None,
            staging_bucket: None,
            long_form_threshold: Duration::from_secs(60),
            long_form_timeout: Duration::from_secs(900),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Speech-to-Text REST client choosing short or long-form recognition per clip
pub struct GoogleSpeechRecognizer {
    client: Client,
    config: SpeechConfig,
    store: Option<Arc<dyn ObjectStore>>,
}

impl GoogleSpeechRecognizer {
    pub fn new(config: SpeechConfig, store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            client: Client::new(),
            config,
            store,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), method)
    }

    async fn recognize_short(&self, clip: &Path, language: &str) -> Result<RecognizeResponse> {
        let content = tokio::fs::read(clip)
            .await
            .map_err(|e| PipelineError::recognition(format!("Failed to read {:?}: {}", clip, e)))?;

        let request = RecognizeRequest {
            config: RecognitionConfig::linear16(language),
            audio: RecognitionAudio {
                content: Some(BASE64_STANDARD.encode(&content)),
                uri: None,
            },
        };

        self.post_json(&self.endpoint("speech:recognize"), &request).await
    }

    async fn recognize_long(
        &self,
        clip: &Path,
        language: &str,
        duration: Duration,
    ) -> Result<RecognizeResponse> {
        let (store, bucket) = match (&self.store, &self.config.staging_bucket) {
            (Some(store), Some(bucket)) => (store.clone(), bucket.clone()),
            _ => {
                return Err(PipelineError::recognition(format!(
                    "Clip of {:.1}s needs long-form recognition but no staging bucket is configured",
                    duration.as_secs_f64()
                )));
            }
        };

        info!(
            "Audio segment is {:.1}s, using long-running recognition",
            duration.as_secs_f64()
        );

        let object = staging_object_name(clip);
        store.upload(&bucket, &object, clip).await.map_err(|e| {
            PipelineError::recognition(format!("Failed to stage clip {:?}: {:#}", clip, e))
        })?;
        let staged = StagedObject::new(store, bucket, object);

        let result = tokio::time::timeout(
            self.config.long_form_timeout,
            self.run_operation(&staged.uri(), language),
        )
        .await;
        staged.delete().await;

        match result {
            Ok(response) => response,
            Err(_) => Err(PipelineError::recognition(format!(
                "Long-running recognition did not finish within {:?}",
                self.config.long_form_timeout
            ))),
        }
    }

    async fn run_operation(&self, uri: &str, language: &str) -> Result<RecognizeResponse> {
        let request = RecognizeRequest {
            config: RecognitionConfig::linear16(language),
            audio: RecognitionAudio {
                content: None,
                uri: Some(uri.to_string()),
            },
        };

        let mut operation: Operation = self
            .post_json(&self.endpoint("speech:longrunningrecognize"), &request)
            .await?;
        info!("Waiting for long-running operation {}", operation.name);

        let poll_url = self.endpoint(&format!("operations/{}", operation.name));
        while !operation.done {
            tokio::time::sleep(self.config.poll_interval).await;
            operation = self.get_json(&poll_url).await?;
            debug!("Operation {} done={}", operation.name, operation.done);
        }

        if let Some(error) = operation.error {
            return Err(PipelineError::recognition(format!(
                "Long-running recognition failed ({}): {}",
                error.code, error.message
            )));
        }

        Ok(operation.response.unwrap_or_default())
    }

    async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let request = self.client.post(url).json(body);
        let response = with_bearer(request, self.config.access_token.as_deref())
            .send()
            .await
            .map_err(|e| PipelineError::recognition(format!("Speech request failed: {}", e)))?;
        parse_response(response).await
    }

    async fn get_json<T>(&self, url: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = self.client.get(url);
        let response = with_bearer(request, self.config.access_token.as_deref())
            .send()
            .await
            .map_err(|e| PipelineError::recognition(format!("Speech request failed: {}", e)))?;
        parse_response(response).await
    }
}

#[async_trait]
impl Recognizer for GoogleSpeechRecognizer {
    async fn transcribe(&self, clip: &Path, language: &str) -> Result<Option<String>> {
        let duration = wav_duration(clip).map_err(|e| {
            PipelineError::recognition(format!("Failed to read clip header {:?}: {}", clip, e))
        })?;

        let response = if duration < self.config.long_form_threshold {
            self.recognize_short(clip, language).await?
        } else {
            self.recognize_long(clip, language, duration).await?
        };

        Ok(response.joined_transcript())
    }
}

async fn parse_response<T>(response: reqwest::Response) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(PipelineError::recognition(format!(
            "Speech API error: {} - {}",
            status, body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| PipelineError::recognition(format!("Failed to parse Speech API response: {}", e)))
}

/// Unique staging name so concurrent jobs never overwrite each other's clips
fn staging_object_name(clip: &Path) -> String {
    let file_name = clip
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("clip.wav");
    format!(
        "{}/{}-{}",
        STAGING_PREFIX,
        uuid::Uuid::new_v4().simple(),
        file_name
    )
}

/// A clip uploaded for long-running recognition.
///
/// Deleted explicitly on the normal path; if the owning future is dropped
/// first, the deletion is spawned onto the runtime instead.
struct StagedObject {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    object: String,
    deleted: bool,
}

impl StagedObject {
    fn new(store: Arc<dyn ObjectStore>, bucket: String, object: String) -> Self {
        Self {
            store,
            bucket,
            object,
            deleted: false,
        }
    }

    fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.object)
    }

    async fn delete(mut self) {
        if let Err(e) = self.store.delete(&self.bucket, &self.object).await {
            warn!("Failed to delete staged clip {}: {:#}", self.uri(), e);
        }
        self.deleted = true;
    }
}

impl Drop for StagedObject {
    fn drop(&mut self) {
        if self.deleted {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Staged clip {} left behind: no runtime to delete it", self.uri());
            return;
        };

        let store = self.store.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let object = std::mem::take(&mut self.object);
        handle.spawn(async move {
            if let Err(e) = store.delete(&bucket, &object).await {
                warn!("Failed to delete staged clip gs://{}/{}: {:#}", bucket, object, e);
            }
        });
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: String,
}

impl RecognitionConfig {
    fn linear16(language: &str) -> Self {
        Self {
            encoding: "LINEAR16",
            sample_rate_hertz: TARGET_SAMPLE_RATE,
            language_code: language.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecognizeRequest {
    config: RecognitionConfig,
    audio: RecognitionAudio,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

impl RecognizeResponse {
    /// First alternative of every result block, joined; `None` when nothing was heard
    fn joined_transcript(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .results
            .iter()
            .filter_map(|r| r.alternatives.first())
            .map(|a| a.transcript.trim())
            .filter(|t| !t.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<SpeechAlternative>,
}

#[derive(Debug, Deserialize)]
struct SpeechAlternative {
    #[serde(default)]
    transcript: String,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    response: Option<RecognizeResponse>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}
