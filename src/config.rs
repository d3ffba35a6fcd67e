use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Service configuration read from the environment (and an optional `.env` file)
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Root under which every job gets its own scratch directory
    pub scratch_root: PathBuf,
    /// ffmpeg binary used for normalization
    pub ffmpeg_path: PathBuf,
    /// Diarization service endpoint (receives WAV, returns speaker turns)
    pub diarization_url: String,
    /// Bearer token for the diarization service
    pub diarization_token: Option<String>,
    /// Bearer token for Speech, Storage and Firestore
    pub google_access_token: Option<String>,
    /// Base URL of the Speech-to-Text REST API
    pub speech_api_url: String,
    /// Bucket used for `gs://` media and long-form staging
    pub storage_bucket: Option<String>,
    /// Endpoint that mints short-lived signed download URLs
    pub url_signer_url: Option<String>,
    /// Firestore project; status goes to memory when unset
    pub firestore_project: Option<String>,
    /// Completion webhook
    pub notification_url: Option<String>,
    /// Maximum in-flight recognition calls per job
    pub transcription_concurrency: usize,
    /// Upper wait bound for one segment's recognition call
    pub segment_timeout: Duration,
    /// Clips at or above this length use long-form recognition
    pub long_form_threshold: Duration,
    /// Upper wait bound for one long-running recognition operation
    pub long_form_timeout: Duration,
    /// Lifetime of signed download URLs
    pub signed_url_expiry: Duration,
    /// Upper bound for a whole job
    pub job_timeout: Duration,
    /// Number of concurrent job workers
    pub workers: usize,
}

impl ServiceConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        // A missing .env file is normal in deployments that inject variables.
        dotenvy::dotenv().ok();

        let diarization_url = std::env::var("DIARIZATION_URL")
            .context("DIARIZATION_URL environment variable not set")?;

        let scratch_root = std::env::var("TURNSCRIBE_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("turnscribe"));

        Ok(Self {
            scratch_root,
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            diarization_url,
            diarization_token: optional_var("HUGGING_FACE_TOKEN"),
            google_access_token: optional_var("GOOGLE_ACCESS_TOKEN"),
            speech_api_url: optional_var("SPEECH_API_URL")
                .unwrap_or_else(|| "https://speech.googleapis.com/v1".to_string()),
            storage_bucket: optional_var("FIREBASE_STORAGE_BUCKET"),
            url_signer_url: optional_var("URL_SIGNER_URL"),
            firestore_project: optional_var("FIRESTORE_PROJECT_ID"),
            notification_url: optional_var("NOTIFICATION_SERVICE_URL"),
            transcription_concurrency: parse_var("TRANSCRIPTION_CONCURRENCY", 10)?,
            segment_timeout: Duration::from_secs(parse_var("SEGMENT_TIMEOUT_SECS", 1200)?),
            long_form_threshold: Duration::from_secs(parse_var("LONG_FORM_THRESHOLD_SECS", 60)?),
            long_form_timeout: Duration::from_secs(parse_var("LONG_FORM_TIMEOUT_SECS", 900)?),
            signed_url_expiry: Duration::from_secs(parse_var("SIGNED_URL_EXPIRY_SECS", 900)?),
            job_timeout: Duration::from_secs(parse_var("JOB_TIMEOUT_SECS", 7200)?),
            workers: parse_var("WORKERS", 1)?,
        })
    }
}

/// Read a variable, treating empty values as unset
fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a numeric variable, falling back to `default` when unset
fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
}
