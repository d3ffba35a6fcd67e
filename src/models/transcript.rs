use serde::{Deserialize, Serialize};

use super::TranscriptFragment;

/// Assembled transcript: fragments in ascending start order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub fragments: Vec<TranscriptFragment>,
}

/// Structured view of one transcript line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub speaker: String,
    /// Start time as HH:MM
    pub time: String,
    pub transcript: String,
}

impl Transcript {
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// One `<speaker>: <text>` line per fragment, newline separated
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| format!("{}: {}", f.speaker, f.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn segments(&self) -> Vec<TranscriptSegment> {
        self.fragments
            .iter()
            .map(|f| TranscriptSegment {
                speaker: f.speaker.clone(),
                time: format_clock(f.start_ms),
                transcript: f.text.clone(),
            })
            .collect()
    }
}

impl std::fmt::Display for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

/// Format milliseconds as HH:MM (seconds truncated)
pub fn format_clock(ms: u64) -> String {
    let total_minutes = ms / 60_000;
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}
