//! Weather providers
//!
//! Providers fetch the current conditions for a coordinate pair and return a
//! [`Reading`]. The ingestion layer only talks to the [`WeatherProvider`]
//! trait, so alternate providers (or the [`StubProvider`] test double) can be
//! substituted without touching callers.

mod client;
mod open_meteo;
mod stub;

pub use client::{ProviderError, Reading, WeatherProvider};
pub use open_meteo::{OpenMeteoConfig, OpenMeteoProvider, DEFAULT_BASE_URL};
pub use stub::StubProvider;
