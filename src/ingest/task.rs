//! Ingestion task
//!
//! Fetch and persist are separate steps so the runner can execute them in
//! different contexts. A fetch that fails or misses its deadline never
//! reaches the persist step.

use crate::provider::{ProviderError, Reading, WeatherProvider};
use crate::store::{Measurement, MeasurementStore, PutOutcome, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Why an ingestion did not store a measurement
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider payload invalid: {0}")]
    ProviderPayloadInvalid(String),

    #[error("store write failed: {0}")]
    Store(#[from] StoreError),

    #[error("store write aborted: {0}")]
    WriteAborted(String),

    #[error("ingestion cancelled before completion")]
    Cancelled,
}

impl From<ProviderError> for IngestError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Unavailable(message) => IngestError::ProviderUnavailable(message),
            ProviderError::PayloadInvalid(message) => IngestError::ProviderPayloadInvalid(message),
        }
    }
}

/// One fetch-then-persist unit of work for a single source key
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionTask {
    /// Stable identifier of the measured place
    pub source_key: String,
    /// Latitude to fetch
    pub latitude: f64,
    /// Longitude to fetch
    pub longitude: f64,
}

impl IngestionTask {
    /// Create a new task
    pub fn new(source_key: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            source_key: source_key.into(),
            latitude,
            longitude,
        }
    }

    /// Fetch the current reading, giving up once `deadline` elapses
    ///
    /// On timeout the in-flight request future is dropped.
    pub async fn fetch(
        &self,
        provider: &dyn WeatherProvider,
        deadline: Duration,
    ) -> Result<Reading, IngestError> {
        let fetch = provider.fetch_current(self.latitude, self.longitude);
        match tokio::time::timeout(deadline, fetch).await {
            Ok(result) => result.map_err(IngestError::from),
            Err(_) => Err(IngestError::ProviderUnavailable(format!(
                "{} did not answer within {:?}",
                provider.name(),
                deadline
            ))),
        }
    }

    /// Write a fetched reading as this task's measurement
    pub fn persist(
        &self,
        reading: &Reading,
        store: &dyn MeasurementStore,
    ) -> Result<PutOutcome, IngestError> {
        let measurement =
            Measurement::from_reading(&self.source_key, self.latitude, self.longitude, reading);
        Ok(store.put(measurement)?)
    }

    /// Fetch, then persist on success
    pub async fn run(
        &self,
        provider: &dyn WeatherProvider,
        store: &dyn MeasurementStore,
        deadline: Duration,
    ) -> Result<PutOutcome, IngestError> {
        let reading = self.fetch(provider, deadline).await?;
        self.persist(&reading, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StubProvider;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn bari_reading() -> Reading {
        Reading {
            latitude: 41.12,
            longitude: 16.87,
            temperature: 22.5,
            wind_speed: 10.0,
            observed_at: Utc.with_ymd_and_hms(2025, 12, 3, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_run_stores_measurement() {
        let provider = StubProvider::with_reading(bari_reading());
        let store = MemoryStore::new();
        let task = IngestionTask::new("Bari", 41.12, 16.87);

        let outcome = task.run(&provider, &store, Duration::from_secs(10)).await.unwrap();
        let stored = outcome.stored().cloned().unwrap();

        assert_eq!(stored.temperature, 22.5);
        assert_eq!(stored.wind_speed, 10.0);
        assert_eq!(store.get_latest("Bari").unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_provider_failures_do_not_write() {
        let store = MemoryStore::new();
        let task = IngestionTask::new("Bari", 41.12, 16.87);

        let unavailable = StubProvider::with_error(ProviderError::Unavailable("refused".into()));
        let err = task.run(&unavailable, &store, Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, IngestError::ProviderUnavailable(_)));

        let invalid =
            StubProvider::with_error(ProviderError::PayloadInvalid("missing field".into()));
        let err = task.run(&invalid, &store, Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, IngestError::ProviderPayloadInvalid(_)));

        assert!(store.get_latest("Bari").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_fetch_and_skips_persist() {
        let provider =
            StubProvider::with_reading(bari_reading()).with_delay(Duration::from_secs(30));
        let store = MemoryStore::new();
        let task = IngestionTask::new("Bari", 41.12, 16.87);

        let err = task.run(&provider, &store, Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, IngestError::ProviderUnavailable(_)));
        assert!(err.to_string().contains("did not answer"));
        assert!(store.get_latest("Bari").unwrap().is_none());
    }
}
