//! Configuration schema definitions

use crate::ingest::{RunnerConfig, Schedule, ScheduledSource};
use crate::provider::{OpenMeteoConfig, DEFAULT_BASE_URL};
use crate::store::WritePolicy;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for Skywatch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkywatchConfig {
    /// Weather provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Worker pool and queue sizing
    #[serde(default)]
    pub runner: RunnerSettings,

    /// Where measurements are kept
    #[serde(default)]
    pub store: StoreConfig,

    /// Recurring ingestion
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Defaults for on-demand requests that omit a location
    #[serde(default)]
    pub on_demand: SourceConfig,
}

impl SkywatchConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.provider.base_url.trim().is_empty() {
            bail!("Provider base_url must not be empty");
        }
        if self.provider.timeout_secs == 0 {
            bail!("Provider timeout_secs must be at least 1");
        }

        if self.runner.workers == 0 {
            bail!("Runner workers must be at least 1");
        }
        if self.runner.queue_capacity == 0 {
            bail!("Runner queue_capacity must be at least 1");
        }

        if self.store.backend == StoreBackend::Sqlite && self.store.path.is_none() {
            bail!("The sqlite store backend requires a path");
        }

        if self.schedule.interval_secs == 0 {
            bail!("Schedule interval_secs must be at least 1");
        }

        let mut seen = HashSet::new();
        for source in &self.schedule.sources {
            source.validate()?;
            if !seen.insert(source.key.as_str()) {
                bail!("Source '{}' is scheduled more than once", source.key);
            }
        }
        self.on_demand.validate()?;

        Ok(())
    }

    /// Provider settings as the provider's own config type
    pub fn open_meteo(&self) -> OpenMeteoConfig {
        let mut config = OpenMeteoConfig::new(&self.provider.base_url)
            .with_timeout(Duration::from_secs(self.provider.timeout_secs));
        if let Some(key) = &self.provider.api_key {
            config = config.with_api_key(key);
        }
        config
    }

    /// Runner settings; the fetch deadline follows the provider timeout
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            workers: self.runner.workers,
            queue_capacity: self.runner.queue_capacity,
            fetch_timeout: Duration::from_secs(self.provider.timeout_secs),
        }
    }

    /// The recurring schedule
    pub fn schedule(&self) -> Schedule {
        Schedule {
            interval: Duration::from_secs(self.schedule.interval_secs),
            fire_immediately: self.schedule.fire_immediately,
            sources: self
                .schedule
                .sources
                .iter()
                .map(|s| ScheduledSource::new(&s.key, s.latitude, s.longitude))
                .collect(),
        }
    }
}

/// Provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Forecast endpoint (default: public Open-Meteo API)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds (default: 10)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// API key for commercial endpoints
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_base_url() -> String { DEFAULT_BASE_URL.to_string() }
fn default_timeout_secs() -> u64 { 10 }

/// Runner sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Concurrent fetches (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pending task limit before submissions are rejected (default: 64)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workers() -> usize { 4 }
fn default_queue_capacity() -> usize { 64 }

/// Storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage backend (default: memory)
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file for the sqlite backend
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How older observations are treated (default: overwrite)
    #[serde(default)]
    pub write_policy: WritePolicy,
}

/// Types of storage backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process memory, lost on exit
    #[default]
    Memory,
    /// SQLite database file
    Sqlite,
}

/// Recurring ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between ticks (default: 600)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Fire the first tick at startup (default: false)
    #[serde(default)]
    pub fire_immediately: bool,

    /// Sources fetched on every tick
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            fire_immediately: false,
            sources: Vec::new(),
        }
    }
}

fn default_interval_secs() -> u64 { 600 }

/// A named location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Source key the measurement is stored under
    pub key: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            key: "Bari".to_string(),
            latitude: 41.12,
            longitude: 16.87,
        }
    }
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            bail!("Source keys must not be empty");
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            bail!("Source '{}' latitude must be between -90 and 90", self.key);
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            bail!("Source '{}' longitude must be between -180 and 180", self.key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(key: &str, latitude: f64, longitude: f64) -> SourceConfig {
        SourceConfig {
            key: key.to_string(),
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: SkywatchConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.provider.timeout_secs, 10);
        assert_eq!(config.runner.workers, 4);
        assert_eq!(config.runner.queue_capacity, 64);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.write_policy, WritePolicy::Overwrite);
        assert_eq!(config.schedule.interval_secs, 600);
        assert_eq!(config.on_demand, source("Bari", 41.12, 16.87));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_schedule_config() {
        let yaml = r#"
interval_secs: 300
fire_immediately: true
sources:
  - key: Bari
    latitude: 41.12
    longitude: 16.87
  - key: Naples
    latitude: 40.85
    longitude: 14.27
"#;
        let config: ScheduleConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.interval_secs, 300);
        assert!(config.fire_immediately);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].key, "Naples");
    }

    #[test]
    fn test_runtime_conversions() {
        let mut config = SkywatchConfig::default();
        config.provider.timeout_secs = 5;
        config.provider.api_key = Some("secret".to_string());
        config.schedule.sources.push(source("Bari", 41.12, 16.87));

        let provider = config.open_meteo();
        assert_eq!(provider.timeout, Duration::from_secs(5));
        assert_eq!(provider.api_key.as_deref(), Some("secret"));

        assert_eq!(config.runner_config().fetch_timeout, Duration::from_secs(5));

        let schedule = config.schedule();
        assert_eq!(schedule.interval, Duration::from_secs(600));
        assert_eq!(schedule.sources, vec![ScheduledSource::new("Bari", 41.12, 16.87)]);
    }

    #[test]
    fn test_sqlite_requires_path() {
        let mut config = SkywatchConfig::default();
        config.store.backend = StoreBackend::Sqlite;
        assert!(config.validate().is_err());

        config.store.path = Some(PathBuf::from("skywatch.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_coordinates() {
        let mut config = SkywatchConfig::default();
        config.schedule.sources.push(source("Nowhere", 91.0, 0.0));
        assert!(config.validate().is_err());

        let mut config = SkywatchConfig::default();
        config.on_demand = source("Nowhere", 0.0, -181.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_source_keys() {
        let mut config = SkywatchConfig::default();
        config.schedule.sources.push(source("Bari", 41.12, 16.87));
        config.schedule.sources.push(source("Bari", 41.0, 16.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let mut config = SkywatchConfig::default();
        config.runner.workers = 0;
        assert!(config.validate().is_err());

        let mut config = SkywatchConfig::default();
        config.schedule.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = SkywatchConfig::default();
        config.provider.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
