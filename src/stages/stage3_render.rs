use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::{JobOutcome, Transcript, TranscriptFragment};

/// Execute Stage 3: order fragments by segment start.
///
/// The sort is stable, so fragments sharing a start time keep the order in
/// which their recognitions completed.
pub fn execute_stage3(mut fragments: Vec<TranscriptFragment>) -> Transcript {
    fragments.sort_by_key(|f| f.start_ms);
    info!("Stage 3: Assembled {} transcript lines", fragments.len());
    Transcript { fragments }
}

/// Write a job outcome as pretty JSON
pub fn write_outcome_json(outcome: &JobOutcome, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    serde_json::to_writer_pretty(file, outcome).context("Failed to write JSON")?;
    Ok(())
}

/// Write the `speaker: text` rendering of a transcript
pub fn write_transcript_text(transcript: &Transcript, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    writeln!(file, "{}", transcript.text())?;
    Ok(())
}
