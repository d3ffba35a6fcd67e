use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnscribe::models::DEFAULT_LANGUAGE;
use turnscribe::services::{
    DiarizationConfig, FfmpegTranscoder, FirestoreConfig, FirestoreStatusStore, GcsObjectStore,
    GoogleSpeechRecognizer, HttpDiarizer, HttpMediaFetcher, MemoryStatusStore, Notifier,
    ObjectStore, SpeechConfig, StatusStore, StorageConfig, WebhookNotifier,
};
use turnscribe::stages::{write_outcome_json, write_transcript_text};
use turnscribe::{
    merge_turns, Collaborators, JobOutcome, JobQueue, JobRequest, MediaPipeline, PipelineConfig,
    QueueConfig, ServiceConfig, SpeakerTurn, Stage2Config,
};

#[derive(Parser)]
#[command(name = "turnscribe")]
#[command(author, version, about = "Speaker-attributed transcription pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe a single media file
    Process {
        /// Media URL (https:// or gs://bucket/path)
        #[arg(short, long)]
        media_url: String,

        /// Status document reference (collection/document)
        #[arg(short, long)]
        job_ref: String,

        /// Recognition language (BCP-47)
        #[arg(short, long, default_value = DEFAULT_LANGUAGE)]
        language: String,

        /// Output file for the job outcome (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output file for the plain-text transcript
        #[arg(long)]
        text_output: Option<PathBuf>,

        /// Maximum concurrent recognition calls
        #[arg(long)]
        concurrency: Option<usize>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Transcribe every job listed in a JSON file
    Batch {
        /// JSON array of {"reference", "media_url", "language"} objects
        #[arg(short, long)]
        input: PathBuf,

        /// Number of jobs processed in parallel
        #[arg(short, long)]
        workers: Option<usize>,

        /// Output file for all job outcomes (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show how diarization turns merge into segments, without any audio
    Segments {
        /// JSON array of {"speaker", "start", "end"} turns
        #[arg(short, long)]
        input: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            media_url,
            job_ref,
            language,
            output,
            text_output,
            concurrency,
            verbose,
        } => {
            setup_logging(verbose);
            let mut config = ServiceConfig::from_env()?;
            if let Some(concurrency) = concurrency {
                config.transcription_concurrency = concurrency;
            }
            process_job(
                &config,
                JobRequest::new(job_ref, media_url, language),
                output,
                text_output,
            )
            .await
        }
        Commands::Batch {
            input,
            workers,
            output,
            verbose,
        } => {
            setup_logging(verbose);
            let mut config = ServiceConfig::from_env()?;
            if let Some(workers) = workers {
                config.workers = workers;
            }
            process_batch(&config, input, output).await
        }
        Commands::Segments { input, verbose } => {
            setup_logging(verbose);
            show_segments(input)
        }
    }
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wire production adapters from configuration
fn build_pipeline(config: &ServiceConfig) -> Result<Arc<MediaPipeline>> {
    std::fs::create_dir_all(&config.scratch_root)
        .with_context(|| format!("Failed to create scratch root {:?}", config.scratch_root))?;

    let object_store: Arc<dyn ObjectStore> = Arc::new(GcsObjectStore::new(StorageConfig::new(
        config.google_access_token.clone(),
        config.url_signer_url.clone(),
    )));

    let store: Arc<dyn StatusStore> = match &config.firestore_project {
        Some(project) => Arc::new(FirestoreStatusStore::new(FirestoreConfig::new(
            project.clone(),
            config.google_access_token.clone(),
        ))),
        None => {
            warn!("FIRESTORE_PROJECT_ID not set, job status is kept in memory only");
            Arc::new(MemoryStatusStore::new())
        }
    };

    let recognizer = GoogleSpeechRecognizer::new(
        SpeechConfig {
            api_url: config.speech_api_url.clone(),
            access_token: config.google_access_token.clone(),
            staging_bucket: config.storage_bucket.clone(),
            long_form_threshold: config.long_form_threshold,
            long_form_timeout: config.long_form_timeout,
            ..Default::default()
        },
        Some(object_store.clone()),
    );

    let services = Collaborators {
        fetcher: Arc::new(HttpMediaFetcher::new(
            Some(object_store),
            config.signed_url_expiry,
        )),
        transcoder: Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone())),
        diarizer: Arc::new(HttpDiarizer::new(DiarizationConfig {
            url: config.diarization_url.clone(),
            token: config.diarization_token.clone(),
        })),
        recognizer: Arc::new(recognizer),
        store,
    };

    let pipeline_config = PipelineConfig {
        scratch_root: config.scratch_root.clone(),
        job_timeout: config.job_timeout,
        transcription: Stage2Config {
            max_concurrent: config.transcription_concurrency,
            request_timeout: config.segment_timeout,
        },
    };

    Ok(Arc::new(MediaPipeline::new(services, pipeline_config)))
}

fn build_notifier(config: &ServiceConfig) -> Option<Arc<dyn Notifier>> {
    config
        .notification_url
        .as_ref()
        .map(|url| Arc::new(WebhookNotifier::new(url.clone())) as Arc<dyn Notifier>)
}

async fn process_job(
    config: &ServiceConfig,
    request: JobRequest,
    output: Option<PathBuf>,
    text_output: Option<PathBuf>,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let queue = JobQueue::start(
        pipeline,
        build_notifier(config),
        QueueConfig {
            workers: 1,
            ..Default::default()
        },
    );

    queue.submit(request).await?;
    let outcome = queue
        .drain()
        .await
        .pop()
        .context("Job finished without an outcome")?;

    if let Some(path) = &output {
        write_outcome_json(&outcome, path)?;
        info!("Outcome written to {:?}", path);
    }

    match &outcome.transcript {
        Some(transcript) => {
            if let Some(path) = &text_output {
                write_transcript_text(transcript, path)?;
                info!("Transcript written to {:?}", path);
            } else if output.is_none() {
                println!("{}", transcript);
            }
            Ok(())
        }
        None => anyhow::bail!(
            "Job {} failed: {}",
            outcome.reference,
            outcome.error_message.unwrap_or_default()
        ),
    }
}

async fn process_batch(config: &ServiceConfig, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    info!("Loading jobs from {:?}", input);
    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {:?}", input))?;
    let requests: Vec<JobRequest> =
        serde_json::from_str(&raw).context("Failed to parse job list")?;

    let pipeline = build_pipeline(config)?;
    let queue = JobQueue::start(
        pipeline,
        build_notifier(config),
        QueueConfig {
            workers: config.workers,
            ..Default::default()
        },
    );

    let total = requests.len();
    for request in requests {
        let reference = request.reference.clone();
        if let Err(e) = queue.submit(request).await {
            warn!("Skipping {:?}: {}", reference, e);
        }
    }

    let outcomes = queue.drain().await;
    let done = outcomes.iter().filter(|o| o.is_done()).count();

    if let Some(path) = &output {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        serde_json::to_writer_pretty(file, &outcomes).context("Failed to write JSON")?;
        info!("Outcomes written to {:?}", path);
    } else {
        print_summary(&outcomes);
    }

    info!("Complete: {} of {} jobs done", done, total);
    Ok(())
}

fn print_summary(outcomes: &[JobOutcome]) {
    println!("Batch Summary");
    println!("=============");
    for outcome in outcomes {
        match (&outcome.metadata, &outcome.error_message) {
            (Some(metadata), _) => println!(
                "{}: {} ({} lines, {} speakers, {:.1}s audio)",
                outcome.reference,
                outcome.status,
                outcome.transcript.as_ref().map(|t| t.len()).unwrap_or(0),
                metadata.speakers_count,
                metadata.duration
            ),
            (None, Some(message)) => {
                println!("{}: {} - {}", outcome.reference, outcome.status, message)
            }
            (None, None) => println!("{}: {}", outcome.reference, outcome.status),
        }
    }
}

fn show_segments(input: PathBuf) -> Result<()> {
    info!("Loading turns from {:?}", input);
    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {:?}", input))?;
    let turns: Vec<SpeakerTurn> = serde_json::from_str(&raw).context("Failed to parse turns")?;
    let runs = merge_turns(&turns)?;

    println!("Segments");
    println!("========");
    println!("Turns: {}", turns.len());
    println!("Segments: {}", runs.len());
    println!();

    for run in &runs {
        println!(
            "[{:>9.3}s - {:>9.3}s] {} ({} turns, {:.1}s speech)",
            run.start,
            run.end,
            run.speaker,
            run.spans.len(),
            run.speech_secs()
        );
    }

    Ok(())
}
