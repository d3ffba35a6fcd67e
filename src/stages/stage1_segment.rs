use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::{write_wav, Waveform};
use crate::error::{PipelineError, Result};
use crate::models::{MergedSegment, SpeakerRun, SpeakerTurn};
use crate::scratch::ScratchSpace;

/// Merge consecutive same-speaker turns into runs.
///
/// A run starts at its first turn's start and ends at its last turn's end.
/// Turns must be finite, non-inverted and ordered by start time; overlapping
/// turns from different speakers are allowed.
pub fn merge_turns(turns: &[SpeakerTurn]) -> Result<Vec<SpeakerRun>> {
    let mut runs: Vec<SpeakerRun> = Vec::new();
    let mut previous_start = f64::NEG_INFINITY;

    for (index, turn) in turns.iter().enumerate() {
        validate_turn(index, turn, previous_start)?;
        previous_start = turn.start;

        match runs.last_mut() {
            Some(run) if run.speaker == turn.speaker => {
                run.end = turn.end;
                run.spans.push((turn.start, turn.end));
            }
            _ => runs.push(SpeakerRun {
                speaker: turn.speaker.clone(),
                start: turn.start,
                end: turn.end,
                spans: vec![(turn.start, turn.end)],
            }),
        }
    }

    Ok(runs)
}

fn validate_turn(index: usize, turn: &SpeakerTurn, previous_start: f64) -> Result<()> {
    if !turn.start.is_finite() || !turn.end.is_finite() {
        return Err(PipelineError::segmentation(format!(
            "Turn {} has a non-finite timestamp",
            index
        )));
    }
    if turn.end < turn.start {
        return Err(PipelineError::segmentation(format!(
            "Turn {} ends ({:.3}s) before it starts ({:.3}s)",
            index, turn.end, turn.start
        )));
    }
    if turn.start < previous_start {
        return Err(PipelineError::segmentation(format!(
            "Turn {} starts at {:.3}s, before the previous turn",
            index, turn.start
        )));
    }
    Ok(())
}

/// Number of distinct speaker labels across all turns
pub fn distinct_speakers(turns: &[SpeakerTurn]) -> usize {
    turns
        .iter()
        .map(|t| t.speaker.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Execute Stage 1: merge turns and export one clip per merged segment.
///
/// Each clip is the concatenation of the constituent turns' audio, so
/// silence between a speaker's own turns is dropped. All clips are on disk
/// before this returns. Export runs on the blocking pool.
pub async fn execute_stage1(
    turns: &[SpeakerTurn],
    waveform: Arc<Waveform>,
    scratch: &ScratchSpace,
) -> Result<Vec<MergedSegment>> {
    let runs = merge_turns(turns)?;
    info!(
        "Stage 1: Merged {} turns into {} segments",
        turns.len(),
        runs.len()
    );

    let planned = plan_clips(runs, scratch);

    tokio::task::spawn_blocking(move || export_clips(planned, &waveform))
        .await
        .map_err(|e| PipelineError::segmentation(format!("Clip export task panicked: {}", e)))?
}

/// Pair each run with a unique clip path
fn plan_clips(runs: Vec<SpeakerRun>, scratch: &ScratchSpace) -> Vec<(SpeakerRun, PathBuf)> {
    let mut taken = HashSet::new();
    runs.into_iter()
        .enumerate()
        .map(|(index, run)| {
            let mut clip_path = scratch.clip_path(&run.speaker, run.start_ms());
            if !taken.insert(clip_path.clone()) {
                // Same speaker at the same millisecond; only zero-length turns get here
                clip_path = scratch.clip_path(&format!("{}_{}", run.speaker, index), run.start_ms());
                taken.insert(clip_path.clone());
            }
            (run, clip_path)
        })
        .collect()
}

fn export_clips(planned: Vec<(SpeakerRun, PathBuf)>, waveform: &Waveform) -> Result<Vec<MergedSegment>> {
    let mut segments = Vec::with_capacity(planned.len());
    for (run, clip_path) in planned {
        let samples: Vec<i16> = run
            .spans
            .iter()
            .flat_map(|&(start, end)| waveform.slice(start, end).iter().copied())
            .collect();

        write_wav(&clip_path, &samples, waveform.sample_rate()).map_err(|e| {
            PipelineError::segmentation(format!("Failed to export clip {:?}: {}", clip_path, e))
        })?;

        debug!(
            "Exported {} ({:.2}s - {:.2}s, {} samples)",
            run.speaker,
            run.start,
            run.end,
            samples.len()
        );

        segments.push(MergedSegment {
            speaker: run.speaker,
            start: run.start,
            end: run.end,
            turn_count: run.spans.len(),
            clip_path,
        });
    }

    Ok(segments)
}
