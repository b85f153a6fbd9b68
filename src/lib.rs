//! Skywatch - Scheduled and on-demand weather ingestion
//!
//! Fetches current conditions from a weather provider, either on request or
//! on a fixed schedule, and keeps the latest measurement per source key.

pub mod config;
pub mod ingest;
pub mod provider;
pub mod store;

pub use config::SkywatchConfig;
pub use ingest::{Ingestor, Scheduler, TaskRunner};
pub use store::{Measurement, MeasurementStore};
