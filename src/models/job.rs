use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Transcript, TranscriptSegment};

/// Language used when a request does not name one
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// One transcription request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// External reference used to correlate status updates (`collection/document`)
    #[serde(alias = "firestore_ref", alias = "job_ref")]
    pub reference: String,
    /// Direct URL or `gs://bucket/path` locator
    pub media_url: String,
    /// BCP-47 language code passed to recognition
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl JobRequest {
    pub fn new(
        reference: impl Into<String>,
        media_url: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            media_url: media_url.into(),
            language: language.into(),
        }
    }
}

/// Job lifecycle status, ordered by progression
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Downloading,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Downloading => "DOWNLOADING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Done => "DONE",
            JobStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Whether `next` is a legal forward transition from this status.
    ///
    /// Stages advance one at a time; ERROR is reachable from any
    /// non-terminal status; terminal statuses never change.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (current, _) if current.is_terminal() => false,
            (_, JobStatus::Error) => true,
            (JobStatus::Queued, JobStatus::Downloading)
            | (JobStatus::Downloading, JobStatus::Processing)
            | (JobStatus::Processing, JobStatus::Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result metadata attached to a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Normalized audio duration in seconds
    pub duration: f64,
    /// Distinct speakers reported by diarization
    pub speakers_count: usize,
    /// Wall-clock processing time in seconds, rounded to 2 decimals
    pub processing_time: f64,
    pub language: String,
}

/// Partial job record update, merged field by field into the stored document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<TranscriptSegment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JobMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StatusUpdate {
    /// Initial record written when a job is accepted
    pub fn queued(received_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Queued),
            received_at: Some(received_at),
            ..Default::default()
        }
    }

    /// Bare status change
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn done(transcript: &Transcript, metadata: JobMetadata, finished_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Done),
            finished_at: Some(finished_at),
            transcript: Some(transcript.text()),
            segments: Some(transcript.segments()),
            metadata: Some(metadata),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>, finished_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Error),
            finished_at: Some(finished_at),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Names of the fields this update sets
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.status.is_some() {
            names.push("status");
        }
        if self.received_at.is_some() {
            names.push("received_at");
        }
        if self.finished_at.is_some() {
            names.push("finished_at");
        }
        if self.transcript.is_some() {
            names.push("transcript");
        }
        if self.segments.is_some() {
            names.push("segments");
        }
        if self.metadata.is_some() {
            names.push("metadata");
        }
        if self.error_message.is_some() {
            names.push("error_message");
        }
        names
    }
}

/// Final result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub reference: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JobMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobOutcome {
    pub fn done(reference: &str, transcript: Transcript, metadata: JobMetadata) -> Self {
        Self {
            reference: reference.to_string(),
            status: JobStatus::Done,
            transcript: Some(transcript),
            metadata: Some(metadata),
            error_message: None,
        }
    }

    pub fn failed(reference: &str, message: impl Into<String>) -> Self {
        Self {
            reference: reference.to_string(),
            status: JobStatus::Error,
            transcript: None,
            metadata: None,
            error_message: Some(message.into()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_forward_transitions() {
        assert!(JobStatus::Queued.can_advance_to(JobStatus::Downloading));
        assert!(JobStatus::Downloading.can_advance_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_advance_to(JobStatus::Done));
    }

    #[test]
    fn test_status_rejects_skips_and_regressions() {
        assert!(!JobStatus::Queued.can_advance_to(JobStatus::Processing));
        assert!(!JobStatus::Processing.can_advance_to(JobStatus::Downloading));
        assert!(!JobStatus::Downloading.can_advance_to(JobStatus::Downloading));
        assert!(!JobStatus::Done.can_advance_to(JobStatus::Error));
        assert!(!JobStatus::Error.can_advance_to(JobStatus::Done));
    }

    #[test]
    fn test_error_reachable_from_non_terminal() {
        for status in [JobStatus::Queued, JobStatus::Downloading, JobStatus::Processing] {
            assert!(status.can_advance_to(JobStatus::Error));
        }
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&JobStatus::Downloading).unwrap(), "\"DOWNLOADING\"");
        assert_eq!(JobStatus::Done.to_string(), "DONE");
    }

    #[test]
    fn test_status_update_skips_unset_fields() {
        let update = StatusUpdate::status(JobStatus::Processing);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"status": "PROCESSING"}));
        assert_eq!(update.field_names(), vec!["status"]);
    }

    #[test]
    fn test_failed_update_fields() {
        let update = StatusUpdate::failed("boom", Utc::now());
        assert_eq!(update.field_names(), vec!["status", "finished_at", "error_message"]);
    }

    #[test]
    fn test_request_accepts_original_field_names() {
        let json = r#"{"firestore_ref": "jobs/1", "media_url": "https://x/a.mp3"}"#;
        let request: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.reference, "jobs/1");
        assert_eq!(request.language, DEFAULT_LANGUAGE);
    }
}
