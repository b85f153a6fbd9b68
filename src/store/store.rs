//! Store trait, write policy and errors

use super::Measurement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How `put` treats an incoming record that is older than the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Last write wins regardless of observation time (default)
    #[default]
    Overwrite,
    /// Only write when `observed_at` is strictly newer than the stored record
    NewerObservation,
}

impl WritePolicy {
    /// Whether `incoming` may replace `existing`
    pub fn accepts(&self, existing: &Measurement, incoming: &Measurement) -> bool {
        match self {
            WritePolicy::Overwrite => true,
            WritePolicy::NewerObservation => incoming.observed_at > existing.observed_at,
        }
    }
}

/// Result of a `put`
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The record was written; carries it as stored
    Stored(Measurement),
    /// The write policy kept a newer stored record
    Superseded {
        /// Observation time of the record that was kept
        existing_observed_at: DateTime<Utc>,
    },
}

impl PutOutcome {
    /// The stored record, if the write happened
    pub fn stored(&self) -> Option<&Measurement> {
        match self {
            PutOutcome::Stored(m) => Some(m),
            PutOutcome::Superseded { .. } => None,
        }
    }
}

/// Storage failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error during {operation}: {source}")]
    Sqlite {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("stored record for '{key}' is corrupt: {message}")]
    CorruptRecord { key: String, message: String },
}

/// Key-value storage for the latest measurement per source key
///
/// `put` and `get_latest` are linearizable per key, and no reader ever sees a
/// partially written record. A missing key is `Ok(None)`, never an error.
pub trait MeasurementStore: Send + Sync {
    /// Write a measurement under its `source_key`, stamping `ingested_at`
    fn put(&self, measurement: Measurement) -> Result<PutOutcome, StoreError>;

    /// Get the latest measurement for a key
    fn get_latest(&self, source_key: &str) -> Result<Option<Measurement>, StoreError>;

    /// All stored measurements, newest observation first
    fn snapshot(&self) -> Result<Vec<Measurement>, StoreError>;

    /// The newest observation across all keys
    fn latest_overall(&self) -> Result<Option<Measurement>, StoreError> {
        Ok(self.snapshot()?.into_iter().next())
    }
}
