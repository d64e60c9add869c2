//! Command-line interface parsing for the rainbowcast one-shot binary
//!
//! The binary drives a single request through the coordinator: a prediction
//! by default, or the raw current observation, radar payload, or a
//! historical lookup.

use chrono::NaiveDate;
use clap::Parser;
use thiserror::Error;

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// Mutually exclusive request flags were combined
    #[error("Choose at most one of --radar, --current-only, --history")]
    ConflictingModes,
}

/// rainbowcast - one-shot rainbow prediction requests from the terminal
#[derive(Parser, Debug)]
#[command(name = "rainbowcast")]
#[command(about = "Rainbow sighting predictions from current weather")]
#[command(version)]
pub struct Cli {
    /// Latitude of the location to query
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude of the location to query
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// Fetch the raw radar payload instead of a prediction
    #[arg(long)]
    pub radar: bool,

    /// Fetch the current observation without scoring it
    #[arg(long)]
    pub current_only: bool,

    /// Look up stored sightings for a date (YYYY-MM-DD) instead
    #[arg(long, value_name = "DATE")]
    pub history: Option<NaiveDate>,

    /// Client identity used for rate limiting
    #[arg(long, default_value = "cli")]
    pub client: String,
}

/// The single request the binary will issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Score the current observation into a prediction
    Prediction,
    /// Return the current observation unscored
    Current,
    /// Return the raw radar payload
    Radar,
    /// Plain historical lookup for a date
    History(NaiveDate),
}

impl RequestMode {
    /// Derives the request mode from parsed CLI arguments
    ///
    /// # Errors
    ///
    /// Returns [`CliError::ConflictingModes`] when more than one mode flag
    /// is present.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let flags = usize::from(cli.radar)
            + usize::from(cli.current_only)
            + usize::from(cli.history.is_some());
        if flags > 1 {
            return Err(CliError::ConflictingModes);
        }

        if let Some(date) = cli.history {
            Ok(RequestMode::History(date))
        } else if cli.radar {
            Ok(RequestMode::Radar)
        } else if cli.current_only {
            Ok(RequestMode::Current)
        } else {
            Ok(RequestMode::Prediction)
        }
    }
}
