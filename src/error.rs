//! Error taxonomy for the transcription pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Media could not be retrieved (network, signer or storage failure)
    #[error("Failed to fetch media: {message}")]
    Fetch { message: String },

    /// Audio normalization failed
    #[error("Failed to transcode media: {message}")]
    Transcode { message: String },

    #[error("Diarization failed: {message}")]
    Diarization { message: String },

    /// Invalid speaker turns or a clip that could not be exported
    #[error("Segmentation failed: {message}")]
    Segmentation { message: String },

    /// Per-segment recognition failure, never fatal to the job
    #[error("Recognition failed: {message}")]
    Recognition { message: String },

    /// Status write failure, never fatal to the job
    #[error("Failed to persist status: {message}")]
    Persistence { message: String },

    /// The whole job exceeded its time limit
    #[error("Job timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Scratch space error: {message}")]
    Scratch { message: String },
}

impl PipelineError {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    pub fn transcode(message: impl Into<String>) -> Self {
        Self::Transcode {
            message: message.into(),
        }
    }

    pub fn diarization(message: impl Into<String>) -> Self {
        Self::Diarization {
            message: message.into(),
        }
    }

    pub fn segmentation(message: impl Into<String>) -> Self {
        Self::Segmentation {
            message: message.into(),
        }
    }

    pub fn recognition(message: impl Into<String>) -> Self {
        Self::Recognition {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Whether this error aborts the job.
    ///
    /// Recognition failures only degrade the transcript and persistence
    /// failures only degrade observability.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Recognition { .. } | Self::Persistence { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
