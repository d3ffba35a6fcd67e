pub mod audio;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod scratch;
pub mod services;
pub mod stages;

#[cfg(test)]
mod testing;

pub use config::ServiceConfig;
pub use error::{PipelineError, Result};
pub use models::{
    JobMetadata, JobOutcome, JobRequest, JobStatus, SpeakerTurn, StatusUpdate, Transcript,
    TranscriptFragment,
};
pub use pipeline::{Collaborators, MediaPipeline, PipelineConfig};
pub use queue::{JobQueue, QueueConfig};
pub use stages::{
    execute_stage1, execute_stage2, execute_stage3, merge_turns, normalize_media, Stage2Config,
};
