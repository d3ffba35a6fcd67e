//! Asynchronous job intake and a fixed pool of pipeline workers.

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{JobOutcome, JobRequest, StatusUpdate};
use crate::pipeline::MediaPipeline;
use crate::services::Notifier;

/// Configuration for the job queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub workers: usize,
    /// Pending jobs held before `submit` waits
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            capacity: 64,
        }
    }
}

/// Accepts jobs, records them as QUEUED and hands them to workers.
///
/// Each job runs on exactly one worker. Finished outcomes are collected
/// by [`JobQueue::drain`].
pub struct JobQueue {
    pipeline: Arc<MediaPipeline>,
    sender: mpsc::Sender<JobRequest>,
    workers: Vec<JoinHandle<()>>,
    outcomes: mpsc::UnboundedReceiver<JobOutcome>,
}

impl JobQueue {
    pub fn start(
        pipeline: Arc<MediaPipeline>,
        notifier: Option<Arc<dyn Notifier>>,
        config: QueueConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (outcome_tx, outcomes) = mpsc::unbounded_channel();

        let worker_count = config.workers.max(1);
        info!("Starting {} workers", worker_count);

        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    receiver.clone(),
                    pipeline.clone(),
                    notifier.clone(),
                    outcome_tx.clone(),
                ))
            })
            .collect();

        Self {
            pipeline,
            sender,
            workers,
            outcomes,
        }
    }

    /// Validate a request, record it as QUEUED and enqueue it.
    ///
    /// The QUEUED write is best effort; the job is enqueued either way.
    pub async fn submit(&self, request: JobRequest) -> Result<()> {
        if request.reference.trim().is_empty() {
            bail!("Job reference is required");
        }
        if request.media_url.trim().is_empty() {
            bail!("Media URL is required for {}", request.reference);
        }

        let store = self.pipeline.store();
        if let Err(e) = store
            .update(&request.reference, &StatusUpdate::queued(Utc::now()))
            .await
        {
            warn!("Failed to record {} as queued: {}", request.reference, e);
        }

        info!("Queued {}", request.reference);
        self.sender
            .send(request)
            .await
            .map_err(|e| anyhow::anyhow!("Queue is closed, dropped {}", e.0.reference))
    }

    /// Stop accepting jobs, wait for every queued job to finish and return
    /// their outcomes in completion order
    pub async fn drain(self) -> Vec<JobOutcome> {
        let Self {
            sender,
            workers,
            mut outcomes,
            ..
        } = self;
        drop(sender);

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker panicked: {}", e);
            }
        }

        let mut results = Vec::new();
        while let Ok(outcome) = outcomes.try_recv() {
            results.push(outcome);
        }
        results
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<JobRequest>>>,
    pipeline: Arc<MediaPipeline>,
    notifier: Option<Arc<dyn Notifier>>,
    outcomes: mpsc::UnboundedSender<JobOutcome>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(request) = next else {
            debug!("Worker {} stopping", id);
            break;
        };

        debug!("Worker {} picked up {}", id, request.reference);
        let outcome = pipeline.process(&request).await;

        if let Some(notifier) = &notifier {
            if let Err(e) = notifier.notify(&request.reference).await {
                error!("Notification for {} failed: {}", request.reference, e);
            }
        }

        let _ = outcomes.send(outcome);
    }
}
