//! Provider trait and Reading definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Current conditions as reported by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Latitude echoed by the provider (may be snapped to its grid)
    pub latitude: f64,

    /// Longitude echoed by the provider
    pub longitude: f64,

    /// Air temperature, provider units
    pub temperature: f64,

    /// Wind speed, provider units
    pub wind_speed: f64,

    /// When the provider says the reading was taken
    pub observed_at: DateTime<Utc>,
}

/// Failures talking to a provider
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Network failure, timeout or an error status from the provider.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The response did not match the expected payload shape.
    #[error("provider payload invalid: {0}")]
    PayloadInvalid(String),
}

/// Trait for current-conditions providers
///
/// Implementations perform at most one outbound call per invocation and never
/// retry; retry policy belongs to whoever submits the ingestion.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Get the name of this provider
    fn name(&self) -> &str;

    /// Fetch the current conditions at the given coordinates
    async fn fetch_current(&self, latitude: f64, longitude: f64) -> Result<Reading, ProviderError>;
}
