//! Per-job orchestration: status tracking, stage sequencing and cleanup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::audio::Waveform;
use crate::error::{PipelineError, Result};
use crate::models::{JobMetadata, JobOutcome, JobRequest, JobStatus, StatusUpdate, Transcript};
use crate::scratch::ScratchSpace;
use crate::services::{Diarizer, MediaFetcher, Recognizer, StatusStore, Transcoder};
use crate::stages::{
    distinct_speakers, execute_stage1, execute_stage2, execute_stage3, normalize_media, Stage2Config,
};

/// Configuration for the pipeline controller
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent directory for per-job scratch spaces
    pub scratch_root: PathBuf,
    /// Deadline for a whole job, from DOWNLOADING to a terminal status
    pub job_timeout: Duration,
    pub transcription: Stage2Config,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("turnscribe"),
            job_timeout: Duration::from_secs(2 * 60 * 60),
            transcription: Stage2Config::default(),
        }
    }
}

/// External collaborators the pipeline drives
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn MediaFetcher>,
    pub transcoder: Arc<dyn Transcoder>,
    pub diarizer: Arc<dyn Diarizer>,
    pub recognizer: Arc<dyn Recognizer>,
    pub store: Arc<dyn StatusStore>,
}

/// Runs jobs end to end.
///
/// Status moves strictly forward through DOWNLOADING, PROCESSING and then
/// DONE or ERROR. Status writes are best effort. The job's scratch space is
/// removed on every exit path, including timeouts.
pub struct MediaPipeline {
    services: Collaborators,
    config: PipelineConfig,
}

impl MediaPipeline {
    pub fn new(services: Collaborators, config: PipelineConfig) -> Self {
        Self { services, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn StatusStore> {
        self.services.store.clone()
    }

    /// Process one job; always returns a terminal outcome
    pub async fn process(&self, request: &JobRequest) -> JobOutcome {
        let span = info_span!("job", reference = %request.reference);
        self.process_inner(request).instrument(span).await
    }

    async fn process_inner(&self, request: &JobRequest) -> JobOutcome {
        let started = Instant::now();
        info!("Processing {} ({})", request.media_url, request.language);

        let mut reporter = StatusReporter::new(self.services.store.as_ref(), &request.reference);
        reporter
            .advance(StatusUpdate::status(JobStatus::Downloading))
            .await;

        let mut scratch = None;
        let result = match tokio::time::timeout(
            self.config.job_timeout,
            self.run_stages(request, &mut scratch, &mut reporter, started),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout {
                seconds: self.config.job_timeout.as_secs(),
            }),
        };

        let outcome = match result {
            Ok((transcript, metadata)) => {
                info!(
                    "Job complete: {} lines, {} speakers, {:.2}s",
                    transcript.len(),
                    metadata.speakers_count,
                    metadata.processing_time
                );
                reporter
                    .advance(StatusUpdate::done(&transcript, metadata.clone(), Utc::now()))
                    .await;
                JobOutcome::done(&request.reference, transcript, metadata)
            }
            Err(e) => {
                error!("Job failed: {}", e);
                let message = e.to_string();
                reporter
                    .advance(StatusUpdate::failed(message.clone(), Utc::now()))
                    .await;
                JobOutcome::failed(&request.reference, message)
            }
        };

        if let Some(mut scratch) = scratch {
            match scratch.cleanup() {
                Ok(report) if report.leftover_clips > 0 => warn!(
                    "Cleanup removed {} files, including {} leftover clips",
                    report.files_removed, report.leftover_clips
                ),
                Ok(report) => info!("Cleanup removed {} files", report.files_removed),
                Err(e) => error!("Cleanup failed: {}", e),
            }
        }

        outcome
    }

    async fn run_stages(
        &self,
        request: &JobRequest,
        scratch_slot: &mut Option<ScratchSpace>,
        reporter: &mut StatusReporter<'_>,
        started: Instant,
    ) -> Result<(Transcript, JobMetadata)> {
        let scratch = scratch_slot.insert(ScratchSpace::create(
            &self.config.scratch_root,
            &request.reference,
        )?);

        let media = normalize_media(
            self.services.fetcher.as_ref(),
            self.services.transcoder.as_ref(),
            &request.media_url,
            scratch,
        )
        .await?;

        reporter
            .advance(StatusUpdate::status(JobStatus::Processing))
            .await;

        let waveform = load_waveform(media.normalized_path.clone()).await?;
        info!("Audio duration: {:.2}s", waveform.duration_secs());

        let turns = self.services.diarizer.diarize(&media.normalized_path).await?;
        let speakers_count = distinct_speakers(&turns);
        info!("Diarization: {} turns, {} speakers", turns.len(), speakers_count);

        let duration = waveform.duration_secs();
        let segments = execute_stage1(&turns, waveform, scratch).await?;

        let stage2 = execute_stage2(
            self.services.recognizer.clone(),
            segments,
            &request.language,
            &self.config.transcription,
        )
        .await;

        let transcript = execute_stage3(stage2.fragments);

        let metadata = JobMetadata {
            duration,
            speakers_count,
            processing_time: round_centis(started.elapsed().as_secs_f64()),
            language: request.language.clone(),
        };

        Ok((transcript, metadata))
    }
}

/// Decode the normalized audio on the blocking pool
async fn load_waveform(path: PathBuf) -> Result<Arc<Waveform>> {
    let waveform = tokio::task::spawn_blocking(move || Waveform::load(&path))
        .await
        .map_err(|e| PipelineError::transcode(format!("Audio load task panicked: {}", e)))?
        .map_err(|e| PipelineError::transcode(format!("Normalized audio is unreadable: {}", e)))?;
    Ok(Arc::new(waveform))
}

/// Tracks the last status of a job and only writes forward transitions
struct StatusReporter<'a> {
    store: &'a dyn StatusStore,
    reference: &'a str,
    current: JobStatus,
}

impl<'a> StatusReporter<'a> {
    fn new(store: &'a dyn StatusStore, reference: &'a str) -> Self {
        Self {
            store,
            reference,
            current: JobStatus::Queued,
        }
    }

    async fn advance(&mut self, update: StatusUpdate) {
        let Some(next) = update.status else {
            return;
        };
        if !self.current.can_advance_to(next) {
            warn!("Ignoring status change {} -> {}", self.current, next);
            return;
        }

        self.current = next;
        if let Err(e) = self.store.update(self.reference, &update).await {
            warn!("Status {} not persisted: {}", next, e);
        }
    }
}

fn round_centis(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
