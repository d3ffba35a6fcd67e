use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use super::StatusStore;
use crate::error::{PipelineError, Result};
use crate::models::{JobStatus, StatusUpdate};

/// Attempted updates kept for inspection; older entries are dropped first
pub const HISTORY_LIMIT: usize = 1024;

/// In-process status store with the same field-merge semantics as Firestore.
///
/// Used when no document database is configured, and by tests.
pub struct MemoryStatusStore {
    documents: Mutex<HashMap<String, Map<String, Value>>>,
    history: Mutex<VecDeque<(String, StatusUpdate)>>,
    history_limit: usize,
    reject_writes: AtomicBool,
}

impl Default for MemoryStatusStore {
    fn default() -> Self {
        Self::with_history_limit(HISTORY_LIMIT)
    }
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            history_limit,
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail with a persistence error
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Current merged document for a reference
    pub fn document(&self, reference: &str) -> Option<Value> {
        let documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        documents.get(reference).cloned().map(Value::Object)
    }

    /// Recent updates attempted for a reference, in order, including rejected ones
    pub fn updates(&self, reference: &str) -> Vec<StatusUpdate> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history
            .iter()
            .filter(|(r, _)| r == reference)
            .map(|(_, u)| u.clone())
            .collect()
    }

    /// Status values written for a reference, in order
    pub fn statuses(&self, reference: &str) -> Vec<JobStatus> {
        self.updates(reference)
            .iter()
            .filter_map(|u| u.status)
            .collect()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn update(&self, reference: &str, update: &StatusUpdate) -> Result<()> {
        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if self.history_limit > 0 {
                while history.len() >= self.history_limit {
                    history.pop_front();
                }
                history.push_back((reference.to_string(), update.clone()));
            }
        }

        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(PipelineError::persistence("Store is rejecting writes"));
        }

        let Value::Object(fields) = serde_json::to_value(update)
            .map_err(|e| PipelineError::persistence(format!("Failed to encode update: {}", e)))?
        else {
            return Err(PipelineError::persistence("Status update did not encode to an object"));
        };

        if let Some(status) = update.status {
            info!("{} -> {}", reference, status);
        }

        let mut documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        documents
            .entry(reference.to_string())
            .or_default()
            .extend(fields);
        Ok(())
    }
}
