//! rainbowcast prediction core
//!
//! The prediction-and-caching core of the rainbow-sighting backend: scoring
//! of weather observations, a single-flight freshness cache in front of the
//! upstream provider, per-client rate limiting, and the coordinator tying
//! them together.

pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod scoring;
pub mod store;
pub mod types;
pub mod upstream;
