//! Per-job scratch space.
//!
//! Every job run gets its own directory under the configured root, named after
//! the job reference plus a random run id, so concurrent workers never share
//! file names. All transient artifacts (downloaded media, normalized audio,
//! segment clips) live inside it and are removed together.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Prefix shared by every segment clip file
pub const CLIP_PREFIX: &str = "segment_";

/// An isolated temp directory owned by one job run
#[derive(Debug)]
pub struct ScratchSpace {
    dir: PathBuf,
    removed: bool,
}

/// What the final cleanup pass found and removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Segment clips still present at cleanup time
    pub leftover_clips: usize,
    /// All files removed with the directory
    pub files_removed: usize,
}

impl ScratchSpace {
    /// Create a fresh directory for one run of `job_reference`
    pub fn create(root: &Path, job_reference: &str) -> Result<Self> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let dir = root.join(format!(
            "job-{}-{}",
            sanitize_component(job_reference),
            &run_id[..12]
        ));

        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::Scratch {
            message: format!("Failed to create {:?}: {}", dir, e),
        })?;
        debug!("Created scratch space {:?}", dir);

        Ok(Self {
            dir,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path for an arbitrary artifact; the name is sanitized to a single component
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(sanitize_component(name))
    }

    /// Path for the clip of the segment starting at `start_ms`
    pub fn clip_path(&self, speaker: &str, start_ms: u64) -> PathBuf {
        self.dir.join(format!(
            "{}{}_{}.wav",
            CLIP_PREFIX,
            sanitize_component(speaker),
            start_ms
        ))
    }

    /// Segment clips currently on disk
    pub fn leftover_clips(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_clip(path))
            .collect()
    }

    /// Remove the directory and everything in it
    pub fn cleanup(&mut self) -> Result<CleanupReport> {
        if self.removed {
            return Ok(CleanupReport::default());
        }

        let leftover_clips = self.leftover_clips().len();
        let files_removed = std::fs::read_dir(&self.dir)
            .map(|entries| entries.count())
            .unwrap_or(0);

        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PipelineError::Scratch {
                    message: format!("Failed to remove {:?}: {}", self.dir, e),
                });
            }
        }
        self.removed = true;

        Ok(CleanupReport {
            leftover_clips,
            files_removed,
        })
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove scratch space {:?}: {}", self.dir, e);
                }
            }
        }
    }
}

fn is_clip(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(CLIP_PREFIX) && n.ends_with(".wav"))
}

/// Reduce arbitrary text to a safe single path component
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
