//! Core data models for the rainbowcast prediction core
//!
//! This module contains the data types exchanged between the upstream
//! provider, the scoring engine, and the request coordinator, plus the
//! response envelope produced at the HTTP boundary.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A raw weather observation for a location at a point in time
///
/// Produced only by the upstream provider (or replayed from a cache hit) and
/// never mutated after construction. Range validation happens in the scoring
/// engine so that cached raw payloads stay byte-faithful to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherObservation {
    /// Temperature in Celsius
    pub temperature: f64,
    /// Relative humidity percentage (0-100)
    pub humidity: f64,
    /// Atmospheric pressure in hPa
    pub pressure: f64,
    /// Wind speed in m/s
    pub wind_speed: f64,
    /// Wind direction in degrees (0-359)
    pub wind_direction: u16,
    /// Precipitation over the last hour in mm
    pub precipitation: f64,
    /// Cloud cover percentage (0-100)
    pub cloud_cover: f64,
    /// Visibility in km
    pub visibility: f64,
    /// UV index
    pub uv_index: u8,
    /// Human-readable description from the provider
    pub description: String,
    /// When this observation was fetched
    pub timestamp: DateTime<Utc>,
}

/// Raw radar payload from the upstream provider
///
/// The core caches and forwards radar data verbatim; it never interprets the
/// provider-specific tile structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarPayload {
    /// Provider payload, passed through untouched
    pub data: serde_json::Value,
    /// When this payload was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Confidence band summarizing agreement among the scoring factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Result of scoring a weather observation for rainbow likelihood
///
/// Derived deterministically from a [`WeatherObservation`]; never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Rainbow-sighting probability, always within [0, 1]
    pub probability: f64,
    /// Binary call: 1 if probability >= 0.5 (a tie counts as positive)
    pub prediction: u8,
    /// Confidence band derived from factor agreement
    pub confidence: Confidence,
    /// Qualitative label per scoring factor, consistent with the bands
    /// that produced the numeric score
    pub factors: BTreeMap<String, String>,
    /// Templated recommendation text chosen by probability bucket
    pub recommendation: String,
    /// Human-readable summary of the observed conditions
    pub conditions: String,
    /// Advisory hint for when a materially different answer may be available
    pub next_update: DateTime<Utc>,
}

/// A historical rainbow sighting as returned by the sighting store
///
/// The historical path is a plain lookup against an external collaborator;
/// it never goes through the cache or the scoring engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSighting {
    /// Unique identifier for the sighting
    pub id: u64,
    /// Latitude coordinate where the sighting was reported
    pub latitude: f64,
    /// Longitude coordinate where the sighting was reported
    pub longitude: f64,
    /// Date of the sighting
    pub sighted_on: NaiveDate,
    /// Reported intensity (1-10)
    pub intensity: u8,
}

/// Successful response envelope produced at the HTTP boundary
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Always true for successful responses
    pub success: bool,
    /// The response payload
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wraps a payload in the success envelope
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
