//! Upstream weather provider client
//!
//! This module defines the provider seam consumed by the request coordinator
//! and an implementation against an OpenWeatherMap-compatible API. Provider
//! latency and failure characteristics are treated opaquely: any request,
//! status, or parse problem surfaces as an [`UpstreamError`] and feeds the
//! cache's stale-on-error path.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::Config;
use crate::types::{RadarPayload, WeatherObservation};

/// Errors that can occur when fetching data from the provider
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP request failed (includes timeouts)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Provider returned status {0}")]
    BadStatus(reqwest::StatusCode),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Missing expected field in response
    #[error("Missing expected field in response: {0}")]
    MissingField(&'static str),
}

/// Seam between the coordinator and the external weather/radar provider
///
/// Implementations own their transport; the core only sees observations,
/// radar payloads, and opaque failures.
pub trait WeatherProvider: Send + Sync + 'static {
    /// Fetches the current weather observation for the given coordinates
    fn fetch_current(
        &self,
        lat: f64,
        lon: f64,
    ) -> impl Future<Output = Result<WeatherObservation, UpstreamError>> + Send;

    /// Fetches the raw radar payload for the given coordinates
    fn fetch_radar(
        &self,
        lat: f64,
        lon: f64,
    ) -> impl Future<Output = Result<RadarPayload, UpstreamError>> + Send;
}

/// Client for an OpenWeatherMap-compatible provider
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    /// Creates a client from configuration
    ///
    /// The HTTP client carries a bounded timeout; an expired timeout is a
    /// fetch failure like any other and lands in the stale-on-error path.
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.upstream_base_url.clone(),
            api_key: config.upstream_api_key.clone(),
        })
    }

    /// Creates a client with an explicit base URL and timeout, for tests
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: String::new(),
        })
    }

    /// Parses a provider response body into a [`WeatherObservation`]
    fn parse_current(&self, response: CurrentResponse) -> Result<WeatherObservation, UpstreamError> {
        let main = response.main.ok_or(UpstreamError::MissingField("main"))?;
        let wind = response.wind.ok_or(UpstreamError::MissingField("wind"))?;
        let clouds = response.clouds.ok_or(UpstreamError::MissingField("clouds"))?;

        let description = response
            .weather
            .first()
            .map(|w| w.description.clone())
            .ok_or(UpstreamError::MissingField("weather"))?;

        // Rain block is absent entirely on dry hours
        let precipitation = response.rain.map(|r| r.one_hour).unwrap_or(0.0);

        Ok(WeatherObservation {
            temperature: main.temp,
            humidity: main.humidity,
            pressure: main.pressure,
            wind_speed: wind.speed,
            wind_direction: (wind.deg.rem_euclid(360.0)) as u16,
            precipitation,
            cloud_cover: clouds.all,
            // Provider reports visibility in metres
            visibility: response.visibility.unwrap_or(10_000.0) / 1000.0,
            uv_index: response.uvi.unwrap_or(0.0).round().max(0.0) as u8,
            description,
            timestamp: Utc::now(),
        })
    }
}

impl WeatherProvider for OpenWeatherClient {
    async fn fetch_current(&self, lat: f64, lon: f64) -> Result<WeatherObservation, UpstreamError> {
        let url = format!(
            "{}/weather?lat={}&lon={}&units=metric&appid={}",
            self.base_url, lat, lon, self.api_key
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(UpstreamError::BadStatus(response.status()));
        }

        let text = response.text().await?;
        let parsed: CurrentResponse = serde_json::from_str(&text)?;
        self.parse_current(parsed)
    }

    async fn fetch_radar(&self, lat: f64, lon: f64) -> Result<RadarPayload, UpstreamError> {
        let url = format!(
            "{}/radar?lat={}&lon={}&appid={}",
            self.base_url, lat, lon, self.api_key
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(UpstreamError::BadStatus(response.status()));
        }

        let text = response.text().await?;
        let data: serde_json::Value = serde_json::from_str(&text)?;

        Ok(RadarPayload {
            data,
            fetched_at: Utc::now(),
        })
    }
}

/// Provider current-weather response structure
#[derive(Debug, Deserialize)]
struct CurrentResponse {
    main: Option<MainBlock>,
    wind: Option<WindBlock>,
    clouds: Option<CloudsBlock>,
    rain: Option<RainBlock>,
    visibility: Option<f64>,
    uvi: Option<f64>,
    #[serde(default)]
    weather: Vec<WeatherDescription>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    speed: f64,
    #[serde(default)]
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct CloudsBlock {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct RainBlock {
    #[serde(rename = "1h", default)]
    one_hour: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherDescription {
    description: String,
}
