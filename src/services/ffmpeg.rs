use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::Transcoder;
use crate::audio::TARGET_SAMPLE_RATE;
use crate::error::{PipelineError, Result};

/// Normalizes media with the ffmpeg CLI
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .arg("-nostdin")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-ac")
            .arg("1") // mono
            .arg("-ar")
            .arg(TARGET_SAMPLE_RATE.to_string())
            .arg("-c:a")
            .arg("pcm_s16le")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        info!("Converting {:?} to {:?}", input, output);
        let mut command = self.command(input, output);
        debug!("FFmpeg command: {:?}", command);

        let result = command.output().await.map_err(|e| {
            PipelineError::transcode(format!("Failed to run {:?}: {}", self.ffmpeg_path, e))
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail = stderr_tail(&stderr, 5);
            error!("FFmpeg failed ({}): {}", result.status, tail);
            return Err(PipelineError::transcode(format!(
                "ffmpeg exited with {}: {}",
                result.status, tail
            )));
        }

        Ok(())
    }
}

/// Last `lines` non-empty lines of ffmpeg's stderr
fn stderr_tail(stderr: &str, lines: usize) -> String {
    let kept: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    kept[kept.len().saturating_sub(lines)..].join(" | ")
}
