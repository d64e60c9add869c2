//! Error kinds surfaced by the prediction core
//!
//! A closed set of variants with exhaustive handling at the boundary,
//! replacing ad-hoc error inspection with a tagged enum. Stale-on-error
//! recovery inside the cache is not represented here: it is a local
//! recovery, logged but never surfaced as failure.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::upstream::UpstreamError;

/// Failure outcomes of a coordinated request
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    /// An observation field was outside its declared range; never retried
    #[error("Invalid observation: {field} out of range ({value})")]
    InvalidObservation {
        /// Name of the offending field
        field: &'static str,
        /// The rejected value
        value: f64,
    },

    /// The upstream fetch failed and no usable stale value existed;
    /// safe for the client to retry after backoff
    #[error("Weather provider unavailable")]
    UpstreamUnavailable(#[source] Arc<UpstreamError>),

    /// Admission was refused by the rate limiter; the client should back
    /// off in line with the bucket refill rate
    #[error("Too many requests, please retry later")]
    RateLimited,
}

impl ErrorKind {
    /// HTTP status code this error kind maps to at the boundary
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::InvalidObservation { .. } => 400,
            ErrorKind::UpstreamUnavailable(_) => 500,
            ErrorKind::RateLimited => 429,
        }
    }

    /// Converts the error into the boundary payload
    ///
    /// With `expose_detail` false (any non-development environment) only the
    /// stable message and status cross the boundary; internal diagnostic
    /// detail such as upstream connection errors stays in the logs.
    pub fn to_api_error(&self, expose_detail: bool) -> ApiError {
        let message = match (self, expose_detail) {
            (ErrorKind::UpstreamUnavailable(source), true) => {
                format!("{}: {}", self, source)
            }
            _ => self.to_string(),
        };

        ApiError {
            success: false,
            status: self.status(),
            message,
        }
    }
}

/// Error envelope produced at the HTTP boundary
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Always false for error responses
    pub success: bool,
    /// HTTP status code for this error
    pub status: u16,
    /// Human-readable message, sanitized outside development
    pub message: String,
}
