//! External collaborators of the pipeline.
//!
//! The pipeline only sees the traits below; each has one production adapter
//! in this module tree. Errors are reported in the taxonomy variant of the
//! capability (fetch, transcode, diarization, recognition, persistence).

pub mod diarization;
pub mod ffmpeg;
pub mod fetch;
pub mod firestore;
pub mod memory;
pub mod notify;
pub mod speech;
pub mod storage;

pub use diarization::*;
pub use ffmpeg::*;
pub use fetch::*;
pub use firestore::*;
pub use memory::*;
pub use notify::*;
pub use speech::*;
pub use storage::*;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{MediaLocator, SpeakerTurn, StatusUpdate};

/// Retrieves source media bytes
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, locator: &MediaLocator) -> Result<Vec<u8>>;
}

/// Converts arbitrary media into mono 16 kHz 16-bit WAV
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Produces ordered speaker turns for a normalized audio file
#[async_trait]
pub trait Diarizer: Send + Sync {
    async fn diarize(&self, audio: &Path) -> Result<Vec<SpeakerTurn>>;
}

/// Recognizes speech in one clip.
///
/// `Ok(None)` means the backend heard no speech; the caller drops the segment.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn transcribe(&self, clip: &Path, language: &str) -> Result<Option<String>>;
}

/// Persists partial job record updates with field-level merge semantics
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn update(&self, reference: &str, update: &StatusUpdate) -> Result<()>;
}

/// Object storage used for signed downloads and long-form staging
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short-lived GET URL for an object; never persisted
    async fn signed_url(&self, bucket: &str, object: &str, expiry: Duration) -> anyhow::Result<String>;

    async fn upload(&self, bucket: &str, object: &str, file: &Path) -> anyhow::Result<()>;

    async fn delete(&self, bucket: &str, object: &str) -> anyhow::Result<()>;
}

/// Tells an external service that a job reached a terminal state
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, reference: &str) -> anyhow::Result<()>;
}

/// Attach an optional bearer token to a request
pub(crate) fn with_bearer(
    request: reqwest::RequestBuilder,
    token: Option<&str>,
) -> reqwest::RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}
