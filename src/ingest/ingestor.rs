//! On-demand ingestion and retrieval
//!
//! [`Ingestor`] is what a request-handling layer talks to: it queues
//! ingestions without waiting for them and reads results back from the store.

use super::{IngestionTask, RunnerHandle, Submission, SubmissionRejected, TaskReport, Trigger};
use crate::store::{Measurement, MeasurementStore, StoreError};
use serde::Serialize;
use std::sync::Arc;

/// Reply to an accepted on-demand request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Acknowledgement {
    pub detail: String,
    pub source_key: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&IngestionTask> for Acknowledgement {
    fn from(task: &IngestionTask) -> Self {
        Self {
            detail: "Fetch scheduled".to_string(),
            source_key: task.source_key.clone(),
            latitude: task.latitude,
            longitude: task.longitude,
        }
    }
}

/// Inbound interface over a runner and its store
#[derive(Clone)]
pub struct Ingestor {
    runner: RunnerHandle,
    store: Arc<dyn MeasurementStore>,
}

impl Ingestor {
    /// Create an ingestor; `store` should be the one the runner writes to
    pub fn new(runner: RunnerHandle, store: Arc<dyn MeasurementStore>) -> Self {
        Self { runner, store }
    }

    /// Queue one ingestion and return immediately
    pub fn request_ingestion(
        &self,
        source_key: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Result<Submission, SubmissionRejected> {
        self.runner.submit(
            IngestionTask::new(source_key, latitude, longitude),
            Trigger::OnDemand,
        )
    }

    /// Latest stored measurement for a key; `None` means no data yet
    pub fn get_latest(&self, source_key: &str) -> Result<Option<Measurement>, StoreError> {
        self.store.get_latest(source_key)
    }

    /// Newest observation across all keys
    pub fn latest_overall(&self) -> Result<Option<Measurement>, StoreError> {
        self.store.latest_overall()
    }

    /// Outcome of the last finished ingestion for a key
    pub fn last_report(&self, source_key: &str) -> Option<Arc<TaskReport>> {
        self.runner.last_report(source_key)
    }
}
