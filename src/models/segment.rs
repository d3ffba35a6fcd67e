use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single diarization turn: one speaker over one contiguous span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    /// Speaker label assigned by diarization (e.g. "SPEAKER_00")
    pub speaker: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

impl SpeakerTurn {
    pub fn new(speaker: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            speaker: speaker.into(),
            start,
            end,
        }
    }
}

/// Consecutive same-speaker turns, before any audio is touched
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerRun {
    pub speaker: String,
    /// Start of the first turn
    pub start: f64,
    /// End of the last turn
    pub end: f64,
    /// Constituent turn spans in time order
    pub spans: Vec<(f64, f64)>,
}

impl SpeakerRun {
    pub fn start_ms(&self) -> u64 {
        seconds_to_ms(self.start)
    }

    /// Seconds of speech actually covered by the constituent turns
    pub fn speech_secs(&self) -> f64 {
        self.spans.iter().map(|(s, e)| (e - s).max(0.0)).sum()
    }
}

/// A speaker run with its audio exported as a standalone clip
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSegment {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
    /// Number of diarization turns merged into this segment
    pub turn_count: usize,
    /// Exported WAV clip inside the job's scratch space
    pub clip_path: PathBuf,
}

impl MergedSegment {
    /// Start time in whole milliseconds; the fragment key
    pub fn start_ms(&self) -> u64 {
        seconds_to_ms(self.start)
    }
}

/// Recognized text for one merged segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    pub start_ms: u64,
    pub speaker: String,
    pub text: String,
}

/// Truncate seconds to whole milliseconds; negative and non-finite values map to 0
pub fn seconds_to_ms(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0) as u64
    } else {
        0
    }
}
