//! Test doubles shared by unit tests across the crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::audio::{write_wav, Waveform};
use crate::error::{PipelineError, Result};
use crate::models::{MediaLocator, SpeakerTurn};
use crate::services::{Diarizer, MediaFetcher, ObjectStore, Recognizer, Transcoder};

/// A request received by [`serve`]
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    /// Request target including the query string
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Serve the given `(status, body)` responses, one per connection, in order.
///
/// Returns the base URL and a channel yielding each captured request.
pub async fn serve(
    responses: Vec<(u16, String)>,
) -> (String, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut stream).await;
            let _ = tx.send(request);

            let response = format!(
                "HTTP/1.1 {} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{}", addr), rx)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> CapturedRequest {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find_subslice(&buffer, b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break buffer.len();
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body: Vec<u8> = buffer
        .get(header_end + 4..)
        .map(|b| b.to_vec())
        .unwrap_or_default();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    CapturedRequest {
        method,
        path,
        headers,
        body,
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Fetcher returning fixed bytes or a fixed error
pub struct ScriptedFetcher {
    result: std::result::Result<Vec<u8>, String>,
}

impl ScriptedFetcher {
    pub fn ok(bytes: &[u8]) -> Self {
        Self {
            result: Ok(bytes.to_vec()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl MediaFetcher for ScriptedFetcher {
    async fn fetch(&self, _locator: &MediaLocator) -> Result<Vec<u8>> {
        self.result.clone().map_err(PipelineError::fetch)
    }
}

/// What [`ScriptedTranscoder`] does with each call
pub enum TranscodeScript {
    /// Write this waveform as the normalized output
    Write(Waveform),
    Fail(String),
    /// Write these bytes as the output, whatever they are
    Raw(Vec<u8>),
    /// Report success without producing a file
    NoOutput,
}

pub struct ScriptedTranscoder {
    script: TranscodeScript,
}

impl ScriptedTranscoder {
    pub fn new(script: TranscodeScript) -> Self {
        Self { script }
    }

    /// Writes `seconds` of 16 kHz ramp audio
    pub fn seconds(seconds: u32) -> Self {
        let samples = (0..seconds * 16_000).map(|i| (i % 1000) as i16).collect();
        Self::new(TranscodeScript::Write(Waveform::from_samples(samples, 16_000)))
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        assert!(input.exists(), "transcoder input {:?} missing", input);
        match &self.script {
            TranscodeScript::Write(wave) => write_wav(output, wave.samples(), wave.sample_rate())
                .map_err(|e| PipelineError::transcode(e.to_string())),
            TranscodeScript::Fail(message) => Err(PipelineError::transcode(message.clone())),
            TranscodeScript::Raw(bytes) => {
                std::fs::write(output, bytes).map_err(|e| PipelineError::transcode(e.to_string()))
            }
            TranscodeScript::NoOutput => Ok(()),
        }
    }
}

/// Diarizer returning fixed turns or a fixed error
pub struct ScriptedDiarizer {
    result: std::result::Result<Vec<SpeakerTurn>, String>,
}

impl ScriptedDiarizer {
    pub fn turns(turns: Vec<SpeakerTurn>) -> Self {
        Self { result: Ok(turns) }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl Diarizer for ScriptedDiarizer {
    async fn diarize(&self, _audio: &Path) -> Result<Vec<SpeakerTurn>> {
        self.result.clone().map_err(PipelineError::diarization)
    }
}

/// Per-clip behaviour of [`ScriptedRecognizer`]
#[derive(Debug, Clone)]
pub enum ClipBehavior {
    Text(String),
    Fail(String),
    /// Never answers
    Hang,
    /// No speech recognized
    Silent,
    /// Fails with a non-recognition error, as an adapter that cannot read its clip would
    Unreadable,
}

/// Recognizer keyed by the segment start encoded in the clip file name
#[derive(Default)]
pub struct ScriptedRecognizer {
    behaviors: HashMap<u64, ClipBehavior>,
    delays: HashMap<u64, Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, start_ms: u64, behavior: ClipBehavior) -> Self {
        self.behaviors.insert(start_ms, behavior);
        self
    }

    pub fn with_delay(mut self, start_ms: u64, delay: Duration) -> Self {
        self.delays.insert(start_ms, delay);
        self
    }

    /// Highest number of concurrent calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Clip paths received, in call order
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    /// Default text produced for a clip without a scripted behaviour
    pub fn default_text(start_ms: u64) -> String {
        format!("words at {}", start_ms)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Parse `segment_<speaker>_<start_ms>.wav`
pub fn clip_start_ms(clip: &Path) -> u64 {
    clip.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('_').next())
        .and_then(|s| s.parse().ok())
        .unwrap()
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn transcribe(&self, clip: &Path, _language: &str) -> Result<Option<String>> {
        assert!(clip.exists(), "clip {:?} missing when dispatched", clip);
        self.calls.lock().unwrap().push(clip.to_path_buf());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let start_ms = clip_start_ms(clip);
        let delay = self
            .delays
            .get(&start_ms)
            .copied()
            .unwrap_or(Duration::from_millis(5));
        tokio::time::sleep(delay).await;

        match self.behaviors.get(&start_ms) {
            None => Ok(Some(Self::default_text(start_ms))),
            Some(ClipBehavior::Text(text)) => Ok(Some(text.clone())),
            Some(ClipBehavior::Fail(message)) => Err(PipelineError::recognition(message.clone())),
            Some(ClipBehavior::Silent) => Ok(None),
            Some(ClipBehavior::Unreadable) => Err(PipelineError::Scratch {
                message: format!("Failed to read {:?}", clip),
            }),
            Some(ClipBehavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
        }
    }
}

/// Object store that only signs, returning a fixed URL
pub struct StaticSigner {
    url: String,
    requests: Mutex<Vec<(String, String, Duration)>>,
}

impl StaticSigner {
    pub fn new(url: String) -> Self {
        Self {
            url,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, String, Duration)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for StaticSigner {
    async fn signed_url(&self, bucket: &str, object: &str, expiry: Duration) -> anyhow::Result<String> {
        self.requests
            .lock()
            .unwrap()
            .push((bucket.to_string(), object.to_string(), expiry));
        Ok(self.url.clone())
    }

    async fn upload(&self, _bucket: &str, _object: &str, _file: &Path) -> anyhow::Result<()> {
        anyhow::bail!("upload not supported")
    }

    async fn delete(&self, _bucket: &str, _object: &str) -> anyhow::Result<()> {
        anyhow::bail!("delete not supported")
    }
}

/// Object store recording uploads and deletions
#[derive(Default)]
pub struct RecordingObjectStore {
    uploaded: Mutex<Vec<(String, String)>>,
    deleted: Mutex<Vec<(String, String)>>,
}

impl RecordingObjectStore {
    pub fn uploaded(&self) -> Vec<(String, String)> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn signed_url(&self, bucket: &str, object: &str, _expiry: Duration) -> anyhow::Result<String> {
        Ok(format!("https://signed.example/{}/{}", bucket, object))
    }

    async fn upload(&self, bucket: &str, object: &str, file: &Path) -> anyhow::Result<()> {
        assert!(file.exists());
        self.uploaded
            .lock()
            .unwrap()
            .push((bucket.to_string(), object.to_string()));
        Ok(())
    }

    async fn delete(&self, bucket: &str, object: &str) -> anyhow::Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .push((bucket.to_string(), object.to_string()));
        Ok(())
    }
}

/// Shorthand for building turn lists in tests
pub fn turns(spec: &[(&str, f64, f64)]) -> Vec<SpeakerTurn> {
    spec.iter()
        .map(|&(speaker, start, end)| SpeakerTurn::new(speaker, start, end))
        .collect()
}
