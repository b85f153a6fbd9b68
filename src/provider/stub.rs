//! Stub provider for tests
//!
//! [`StubProvider`] returns pre-configured readings or failures without
//! making network requests. Responses are chosen in this order: the next
//! scripted response, a per-coordinate response, then the default.

use super::{ProviderError, Reading, WeatherProvider};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Response = Result<Reading, ProviderError>;

#[derive(Debug, Clone)]
struct Scripted {
    delay: Duration,
    response: Response,
}

/// Deterministic [`WeatherProvider`] test double
#[derive(Debug)]
pub struct StubProvider {
    default: Response,
    by_location: HashMap<(u64, u64), Response>,
    script: Mutex<VecDeque<Scripted>>,
    delay: Duration,
    echo_coordinates: bool,
    calls: AtomicUsize,
}

impl StubProvider {
    /// Create a provider that always returns the given reading
    pub fn with_reading(reading: Reading) -> Self {
        Self::from_response(Ok(reading))
    }

    /// Create a provider that always fails with the given error
    pub fn with_error(error: ProviderError) -> Self {
        Self::from_response(Err(error))
    }

    /// Create a provider that echoes the requested coordinates back with
    /// fixed values, observed now
    pub fn echo(temperature: f64, wind_speed: f64) -> Self {
        let mut stub = Self::with_reading(Reading {
            latitude: 0.0,
            longitude: 0.0,
            temperature,
            wind_speed,
            observed_at: Utc::now(),
        });
        stub.echo_coordinates = true;
        stub
    }

    fn from_response(response: Response) -> Self {
        Self {
            default: response,
            by_location: HashMap::new(),
            script: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            echo_coordinates: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer requests for these coordinates with a specific response
    pub fn respond_at(mut self, latitude: f64, longitude: f64, response: Response) -> Self {
        self.by_location
            .insert((latitude.to_bits(), longitude.to_bits()), response);
        self
    }

    /// Delay every response that has no scripted delay of its own
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a one-shot response, returned after `delay`
    pub fn push_response(&self, delay: Duration, response: Response) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Scripted { delay, response });
    }

    /// Number of fetches issued so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self, latitude: f64, longitude: f64) -> Scripted {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(scripted) = scripted {
            return scripted;
        }

        let response = self
            .by_location
            .get(&(latitude.to_bits(), longitude.to_bits()))
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        Scripted {
            delay: self.delay,
            response,
        }
    }
}

#[async_trait]
impl WeatherProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn fetch_current(&self, latitude: f64, longitude: f64) -> Result<Reading, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Scripted { delay, response } = self.next_response(latitude, longitude);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        response.map(|mut reading| {
            if self.echo_coordinates {
                reading.latitude = latitude;
                reading.longitude = longitude;
            }
            reading
        })
    }
}
