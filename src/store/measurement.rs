//! Measurement definition

use crate::provider::Reading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The latest reading stored for a source key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Stable identifier of the measured place
    pub source_key: String,

    /// Latitude used for the fetch
    pub latitude: f64,

    /// Longitude used for the fetch
    pub longitude: f64,

    /// Temperature as received from the provider
    pub temperature: f64,

    /// Wind speed as received from the provider
    pub wind_speed: f64,

    /// When the provider says the reading was taken
    pub observed_at: DateTime<Utc>,

    /// When the store accepted the record. Stores overwrite this on `put`.
    pub ingested_at: DateTime<Utc>,
}

impl Measurement {
    /// Build a measurement for `source_key` from a provider reading
    ///
    /// The coordinates are the ones the fetch was issued for, not the
    /// (possibly grid-snapped) ones echoed by the provider.
    pub fn from_reading(
        source_key: impl Into<String>,
        latitude: f64,
        longitude: f64,
        reading: &Reading,
    ) -> Self {
        Self {
            source_key: source_key.into(),
            latitude,
            longitude,
            temperature: reading.temperature,
            wind_speed: reading.wind_speed,
            observed_at: reading.observed_at,
            ingested_at: Utc::now(),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shortest exact float form, e.g. 20.0 or 20.25
        write!(
            f,
            "{} @ {}: {:?}°C",
            self.source_key,
            self.observed_at.format("%Y-%m-%d %H:%M:%S%:z"),
            self.temperature
        )
    }
}
