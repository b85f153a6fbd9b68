//! Open-Meteo provider
//!
//! Fetches current conditions from the Open-Meteo forecast API and converts
//! them into [`Reading`]s.

use super::{ProviderError, Reading, WeatherProvider};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Public Open-Meteo forecast endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

const USER_AGENT: &str = concat!("skywatch/", env!("CARGO_PKG_VERSION"));

/// Open-Meteo API response
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    latitude: f64,
    longitude: f64,
    #[serde(alias = "current")]
    current_weather: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
    #[serde(alias = "wind_speed")]
    windspeed: f64,
    #[serde(default)]
    time: Option<String>,
}

/// Configuration for the Open-Meteo provider
#[derive(Debug, Clone)]
pub struct OpenMeteoConfig {
    /// Forecast endpoint
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Optional API key for commercial endpoints
    pub api_key: Option<String>,
}

impl Default for OpenMeteoConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            api_key: None,
        }
    }
}

impl OpenMeteoConfig {
    /// Create a configuration pointing at the given endpoint
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// Provider backed by the Open-Meteo HTTP API
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    client: Client,
    config: OpenMeteoConfig,
}

impl OpenMeteoProvider {
    /// Create a new provider
    pub fn new(config: OpenMeteoConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Get the provider configuration
    pub fn config(&self) -> &OpenMeteoConfig {
        &self.config
    }

    /// Build the API URL
    fn build_url(&self, latitude: f64, longitude: f64) -> String {
        let mut url = format!(
            "{}?latitude={}&longitude={}&current_weather=true",
            self.config.base_url, latitude, longitude
        );
        if let Some(key) = &self.config.api_key {
            url.push_str("&apikey=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }

    /// Convert a reqwest error into a provider error
    fn transport_error(&self, error: &reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            return ProviderError::Unavailable(format!(
                "request timed out after {}s",
                self.config.timeout.as_secs()
            ));
        }
        ProviderError::Unavailable(format!("failed to fetch weather data: {error}"))
    }
}

/// Parse a provider body into a Reading
///
/// `received_at` stands in for the observation time when the payload does not
/// carry one.
fn parse_reading(body: &str, received_at: DateTime<Utc>) -> Result<Reading, ProviderError> {
    let response: ForecastResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::PayloadInvalid(format!("failed to parse weather response: {e}"))
    })?;

    let observed_at = match response.current_weather.time.as_deref() {
        Some(time) => parse_timestamp(time)?,
        None => received_at,
    };

    Ok(Reading {
        latitude: response.latitude,
        longitude: response.longitude,
        temperature: response.current_weather.temperature,
        wind_speed: response.current_weather.windspeed,
        observed_at,
    })
}

/// Parse an ISO 8601 timestamp, assuming UTC when no offset is given
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ProviderError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Open-Meteo reports local-less times such as "2025-12-03T12:00"
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(ProviderError::PayloadInvalid(format!("invalid observation time '{value}'")))
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn name(&self) -> &str {
        "open-meteo"
    }

    async fn fetch_current(&self, latitude: f64, longitude: f64) -> Result<Reading, ProviderError> {
        let url = self.build_url(latitude, longitude);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "weather API returned status {status}"
            )));
        }

        let body = response.text().await.map_err(|e| self.transport_error(&e))?;
        parse_reading(&body, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn provider(config: OpenMeteoConfig) -> OpenMeteoProvider {
        OpenMeteoProvider::new(config).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = OpenMeteoConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_build_url() {
        let p = provider(OpenMeteoConfig::default());
        let url = p.build_url(41.12, 16.87);
        assert!(url.starts_with("https://api.open-meteo.com/v1/forecast?"));
        assert!(url.contains("latitude=41.12"));
        assert!(url.contains("longitude=16.87"));
        assert!(url.contains("current_weather=true"));
        assert!(!url.contains("apikey"));
    }

    #[test]
    fn test_build_url_custom_base_and_key() {
        let p = provider(
            OpenMeteoConfig::new("https://custom-api.example.com/forecast").with_api_key("a b&c"),
        );
        assert_eq!(p.config().api_key.as_deref(), Some("a b&c"));
        let url = p.build_url(40.85, 14.27);
        assert!(url.starts_with("https://custom-api.example.com/forecast?"));
        assert!(url.ends_with("&apikey=a%20b%26c"));
    }

    #[test]
    fn test_parse_real_api_response() {
        let json = r#"{
            "latitude": 41.12,
            "longitude": 16.87,
            "generationtime_ms": 0.05,
            "utc_offset_seconds": 0,
            "timezone": "GMT",
            "elevation": 12.0,
            "current_weather_units": {"temperature": "°C", "windspeed": "km/h"},
            "current_weather": {
                "time": "2025-12-03T12:00",
                "interval": 900,
                "temperature": 15.5,
                "windspeed": 12.3,
                "winddirection": 200,
                "is_day": 1,
                "weathercode": 3
            }
        }"#;

        let reading = parse_reading(json, Utc::now()).unwrap();
        assert_eq!(reading.latitude, 41.12);
        assert_eq!(reading.longitude, 16.87);
        assert_eq!(reading.temperature, 15.5);
        assert_eq!(reading.wind_speed, 12.3);
        assert_eq!(
            reading.observed_at,
            Utc.with_ymd_and_hms(2025, 12, 3, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_current_alias_without_time() {
        let json = r#"{
            "latitude": 41.12,
            "longitude": 16.87,
            "current": {"temperature": 22.5, "windspeed": 10}
        }"#;
        let received = Utc.with_ymd_and_hms(2025, 12, 3, 9, 30, 0).unwrap();

        let reading = parse_reading(json, received).unwrap();
        assert_eq!(reading.temperature, 22.5);
        assert_eq!(reading.wind_speed, 10.0);
        assert_eq!(reading.observed_at, received);
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let missing_block = r#"{"latitude": 41.12, "longitude": 16.87}"#;
        assert!(matches!(
            parse_reading(missing_block, Utc::now()),
            Err(ProviderError::PayloadInvalid(_))
        ));

        let missing_wind =
            r#"{"latitude": 1.0, "longitude": 2.0, "current_weather": {"temperature": 3.0}}"#;
        assert!(matches!(
            parse_reading(missing_wind, Utc::now()),
            Err(ProviderError::PayloadInvalid(_))
        ));

        assert!(matches!(
            parse_reading("not json", Utc::now()),
            Err(ProviderError::PayloadInvalid(_))
        ));
    }

    #[test]
    fn test_parse_timestamp_utc() {
        let dt = parse_timestamp("2025-12-03T12:00:00+00:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 12, 3, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_naive_assumes_utc() {
        let dt = parse_timestamp("2025-12-03T12:00:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 12, 3, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let dt = parse_timestamp("2025-12-03T12:00:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 12, 3, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
