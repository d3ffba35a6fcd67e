use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::models::{MergedSegment, TranscriptFragment};
use crate::services::Recognizer;

/// Configuration for Stage 2
#[derive(Debug, Clone)]
pub struct Stage2Config {
    /// Upper bound on in-flight recognizer calls
    pub max_concurrent: usize,
    /// Deadline for a single segment's recognition
    pub request_timeout: Duration,
}

impl Default for Stage2Config {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            request_timeout: Duration::from_secs(1200),
        }
    }
}

/// Result of Stage 2 fan-out, built only after every task has finished
#[derive(Debug, Default)]
pub struct Stage2Result {
    /// One fragment per successfully recognized segment, in completion order
    pub fragments: Vec<TranscriptFragment>,
    /// Segments dispatched to the recognizer
    pub dispatched: usize,
    /// Segments whose recognition failed, timed out or whose task died
    pub failed: usize,
    /// Segments where no speech was recognized
    pub silent: usize,
}

/// What one fan-out task reports back
struct SegmentOutcome {
    speaker: String,
    start_ms: u64,
    result: Result<Option<String>, PipelineError>,
}

/// Execute Stage 2: transcribe every segment with bounded concurrency.
///
/// Each task owns its segment's clip and deletes it once the recognizer is
/// done with it, whatever the outcome. A failed segment is logged and left
/// out; it never fails its siblings or the stage.
pub async fn execute_stage2(
    recognizer: Arc<dyn Recognizer>,
    segments: Vec<MergedSegment>,
    language: &str,
    config: &Stage2Config,
) -> Stage2Result {
    let max_concurrent = config.max_concurrent.max(1);
    let semaphore = Arc::new(Semaphore::new(max_concurrent));
    let dispatched = segments.len();

    info!(
        "Stage 2: Transcribing {} segments ({} concurrent)",
        dispatched, max_concurrent
    );

    let mut tasks = JoinSet::new();
    for segment in segments {
        let semaphore = semaphore.clone();
        let recognizer = recognizer.clone();
        let language = language.to_string();
        let timeout = config.request_timeout;

        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => {
                    recognize_with_timeout(recognizer.as_ref(), &segment.clip_path, &language, timeout)
                        .await
                }
                Err(e) => Err(PipelineError::recognition(format!("Dispatch closed: {}", e))),
            };

            remove_clip(&segment.clip_path).await;

            let start_ms = segment.start_ms();
            SegmentOutcome {
                speaker: segment.speaker,
                start_ms,
                result,
            }
        });
    }

    let mut result = Stage2Result {
        dispatched,
        ..Default::default()
    };

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => match outcome.result {
                Ok(Some(text)) => {
                    debug!("Segment {} @ {}ms: {} chars", outcome.speaker, outcome.start_ms, text.len());
                    result.fragments.push(TranscriptFragment {
                        start_ms: outcome.start_ms,
                        speaker: outcome.speaker,
                        text,
                    });
                }
                Ok(None) => {
                    debug!("Segment {} @ {}ms: no speech", outcome.speaker, outcome.start_ms);
                    result.silent += 1;
                }
                Err(e) => {
                    // Fatal-class errors here point at the adapter, not the clip
                    if e.is_fatal() {
                        error!(
                            "Segment {} @ {}ms failed: {}",
                            outcome.speaker, outcome.start_ms, e
                        );
                    } else {
                        warn!(
                            "Segment {} @ {}ms failed: {}",
                            outcome.speaker, outcome.start_ms, e
                        );
                    }
                    result.failed += 1;
                }
            },
            Err(e) => {
                error!("Transcription task panicked: {}", e);
                result.failed += 1;
            }
        }
    }

    info!(
        "Stage 2: {} transcribed, {} silent, {} failed",
        result.fragments.len(),
        result.silent,
        result.failed
    );

    result
}

async fn recognize_with_timeout(
    recognizer: &dyn Recognizer,
    clip: &Path,
    language: &str,
    timeout: Duration,
) -> Result<Option<String>, PipelineError> {
    match tokio::time::timeout(timeout, recognizer.transcribe(clip, language)).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::recognition(format!(
            "Timed out after {}s",
            timeout.as_secs_f64()
        ))),
    }
}

async fn remove_clip(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove clip {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav;
    use crate::scratch::ScratchSpace;
    use crate::testing::{ClipBehavior, ScriptedRecognizer};
    use tempfile::TempDir;

    fn segments(scratch: &ScratchSpace, starts_ms: &[u64]) -> Vec<MergedSegment> {
        starts_ms
            .iter()
            .enumerate()
            .map(|(i, &ms)| {
                let speaker = if i % 2 == 0 { "A" } else { "B" };
                let clip_path = scratch.clip_path(speaker, ms);
                write_wav(&clip_path, &[0i16; 160], 16_000).unwrap();
                MergedSegment {
                    speaker: speaker.to_string(),
                    start: ms as f64 / 1000.0,
                    end: ms as f64 / 1000.0 + 1.0,
                    turn_count: 1,
                    clip_path,
                }
            })
            .collect()
    }

    fn config(max_concurrent: usize) -> Stage2Config {
        Stage2Config {
            max_concurrent,
            request_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn test_all_segments_transcribed() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(root.path(), "jobs/1").unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::new());

        let result = execute_stage2(
            recognizer.clone(),
            segments(&scratch, &[0, 1000, 2000]),
            "en-US",
            &config(10),
        )
        .await;

        assert_eq!(result.dispatched, 3);
        assert_eq!(result.fragments.len(), 3);
        assert_eq!(result.failed, 0);
        assert!(scratch.leftover_clips().is_empty());

        let mut starts: Vec<u64> = result.fragments.iter().map(|f| f.start_ms).collect();
        starts.sort();
        assert_eq!(starts, vec![0, 1000, 2000]);
        assert!(result
            .fragments
            .iter()
            .all(|f| f.text == ScriptedRecognizer::default_text(f.start_ms)));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(root.path(), "jobs/1").unwrap();
        let starts: Vec<u64> = (0..25).map(|i| i * 1000).collect();
        let recognizer = starts.iter().fold(ScriptedRecognizer::new(), |r, &ms| {
            r.with_delay(ms, Duration::from_millis(20))
        });
        let recognizer = Arc::new(recognizer);

        let result = execute_stage2(
            recognizer.clone(),
            segments(&scratch, &starts),
            "en-US",
            &config(4),
        )
        .await;

        assert_eq!(result.fragments.len(), 25);
        assert!(recognizer.peak_in_flight() <= 4);
        assert!(recognizer.peak_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_failed_segment_is_omitted_and_clip_removed() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(root.path(), "jobs/1").unwrap();
        let recognizer = Arc::new(
            ScriptedRecognizer::new().with(2000, ClipBehavior::Fail("quota exceeded".to_string())),
        );

        let result = execute_stage2(
            recognizer,
            segments(&scratch, &[0, 1000, 2000, 3000, 4000]),
            "en-US",
            &config(10),
        )
        .await;

        assert_eq!(result.fragments.len(), 4);
        assert_eq!(result.failed, 1);
        assert!(result.fragments.iter().all(|f| f.start_ms != 2000));
        assert!(scratch.leftover_clips().is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_segment_is_omitted_and_clip_removed() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(root.path(), "jobs/1").unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::new().with(1000, ClipBehavior::Hang));

        let result = execute_stage2(
            recognizer,
            segments(&scratch, &[0, 1000, 2000]),
            "en-US",
            &config(10),
        )
        .await;

        assert_eq!(result.fragments.len(), 2);
        assert_eq!(result.failed, 1);
        assert!(scratch.leftover_clips().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_class_error_only_drops_its_segment() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(root.path(), "jobs/1").unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::new().with(1000, ClipBehavior::Unreadable));

        let result = execute_stage2(
            recognizer,
            segments(&scratch, &[0, 1000, 2000]),
            "en-US",
            &config(10),
        )
        .await;

        assert_eq!(result.fragments.len(), 2);
        assert_eq!(result.failed, 1);
        assert!(result.fragments.iter().all(|f| f.start_ms != 1000));
        assert!(scratch.leftover_clips().is_empty());
    }

    #[tokio::test]
    async fn test_fragment_keeps_segment_speaker_and_start() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(root.path(), "jobs/1").unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::new());

        let result = execute_stage2(
            recognizer,
            segments(&scratch, &[1500, 4250]),
            "en-US",
            &config(1),
        )
        .await;

        let mut fragments = result.fragments;
        fragments.sort_by_key(|f| f.start_ms);
        assert_eq!(fragments[0].speaker, "A");
        assert_eq!(fragments[0].start_ms, 1500);
        assert_eq!(fragments[1].speaker, "B");
        assert_eq!(fragments[1].start_ms, 4250);
    }

    #[tokio::test]
    async fn test_silent_segment_is_omitted() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(root.path(), "jobs/1").unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::new().with(0, ClipBehavior::Silent));

        let result = execute_stage2(
            recognizer,
            segments(&scratch, &[0, 1000]),
            "en-US",
            &config(10),
        )
        .await;

        assert_eq!(result.fragments.len(), 1);
        assert_eq!(result.silent, 1);
        assert_eq!(result.failed, 0);
        assert!(scratch.leftover_clips().is_empty());
    }

    #[tokio::test]
    async fn test_every_failure_still_completes() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(root.path(), "jobs/1").unwrap();
        let recognizer = Arc::new(
            ScriptedRecognizer::new()
                .with(0, ClipBehavior::Fail("boom".to_string()))
                .with(1000, ClipBehavior::Fail("boom".to_string())),
        );

        let result = execute_stage2(
            recognizer,
            segments(&scratch, &[0, 1000]),
            "en-US",
            &config(10),
        )
        .await;

        assert!(result.fragments.is_empty());
        assert_eq!(result.failed, 2);
    }

    #[tokio::test]
    async fn test_no_segments() {
        let recognizer = Arc::new(ScriptedRecognizer::new());
        let result = execute_stage2(recognizer, Vec::new(), "en-US", &config(10)).await;
        assert_eq!(result.dispatched, 0);
        assert!(result.fragments.is_empty());
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_progresses() {
        let root = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(root.path(), "jobs/1").unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::new());

        let result = execute_stage2(
            recognizer.clone(),
            segments(&scratch, &[0, 1000]),
            "en-US",
            &config(0),
        )
        .await;

        assert_eq!(result.fragments.len(), 2);
        assert_eq!(recognizer.peak_in_flight(), 1);
    }
}
