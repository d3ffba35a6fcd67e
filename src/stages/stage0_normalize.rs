use std::path::PathBuf;

use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::MediaLocator;
use crate::scratch::ScratchSpace;
use crate::services::{MediaFetcher, Transcoder};

/// File name of the normalized audio inside the scratch space
pub const NORMALIZED_FILE: &str = "normalized.wav";

/// Result of Stage 0 normalization
#[derive(Debug)]
pub struct NormalizedMedia {
    /// Downloaded source media, as received
    pub original_path: PathBuf,
    /// Mono 16 kHz 16-bit PCM WAV
    pub normalized_path: PathBuf,
    pub bytes_downloaded: usize,
}

/// Execute Stage 0: fetch the media and transcode it to canonical WAV.
///
/// Both files land in the job's scratch space. A transcoder that reports
/// success without leaving a non-empty output file is treated as a failure.
pub async fn normalize_media(
    fetcher: &dyn MediaFetcher,
    transcoder: &dyn Transcoder,
    media_url: &str,
    scratch: &ScratchSpace,
) -> Result<NormalizedMedia> {
    let locator = MediaLocator::parse(media_url)?;
    info!("Stage 0: Downloading {}", locator);

    let bytes = fetcher.fetch(&locator).await?;
    let original_path = scratch.file(&format!("original_{}", locator.file_name()));
    tokio::fs::write(&original_path, &bytes)
        .await
        .map_err(|e| PipelineError::Scratch {
            message: format!("Failed to write {:?}: {}", original_path, e),
        })?;
    info!("Downloaded {} bytes to {:?}", bytes.len(), original_path);

    let normalized_path = scratch.file(NORMALIZED_FILE);
    transcoder.transcode(&original_path, &normalized_path).await?;

    match tokio::fs::metadata(&normalized_path).await {
        Ok(meta) if meta.len() > 0 => {}
        Ok(_) => {
            return Err(PipelineError::transcode("Transcoder produced an empty file"));
        }
        Err(e) => {
            return Err(PipelineError::transcode(format!(
                "Transcoder produced no output: {}",
                e
            )));
        }
    }

    info!("Normalized audio written to {:?}", normalized_path);

    Ok(NormalizedMedia {
        original_path,
        normalized_path,
        bytes_downloaded: bytes.len(),
    })
}
