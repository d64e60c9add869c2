//! Rainbow likelihood scoring engine
//!
//! Maps a raw weather observation to a sighting probability, confidence
//! band, factor breakdown, and recommendation. Scoring is a pure function
//! of the observation: no I/O, no shared state, identical input yields an
//! identical result.

use std::collections::BTreeMap;

use chrono::Duration;
use tracing::debug;

use crate::error::ErrorKind;
use crate::types::{Confidence, PredictionResult, WeatherObservation};

/// Probability at or above which the binary call is positive.
/// A result of exactly 0.5 counts as a positive prediction.
const PREDICTION_THRESHOLD: f64 = 0.5;

/// Individual factor scores (0.0-1.0) for an observation
#[derive(Debug, Clone, Copy)]
pub struct FactorScores {
    /// Temperature score (0.0-1.0)
    pub temperature: f64,
    /// Humidity score (0.0-1.0)
    pub humidity: f64,
    /// Wind score (0.0-1.0)
    pub wind: f64,
    /// Precipitation score (0.0-1.0)
    pub precipitation: f64,
}

impl FactorScores {
    fn as_array(&self) -> [f64; 4] {
        [self.temperature, self.humidity, self.wind, self.precipitation]
    }
}

/// Weights applied when combining factor scores into a probability.
/// Temperature and precipitation dominate; wind and humidity are secondary.
/// The weights sum to 1 so the weighted average stays within [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct FactorWeights {
    pub temperature: f64,
    pub humidity: f64,
    pub wind: f64,
    pub precipitation: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            humidity: 0.2,
            wind: 0.2,
            precipitation: 0.3,
        }
    }
}

/// Hour-indexed outlook over a series of forecast observations
#[derive(Debug, Clone)]
pub struct SeriesOutlook {
    /// Probability and call per hour, in input order
    pub hourly: Vec<HourOutlook>,
    /// Contiguous runs of hours at or above the prediction threshold
    pub peak_windows: Vec<PeakWindow>,
    /// Aggregate view over the whole series
    pub summary: SeriesSummary,
}

/// Outlook for a single hour of the series
#[derive(Debug, Clone)]
pub struct HourOutlook {
    /// Index of the observation within the series
    pub hour: usize,
    /// Scored probability; an invalid observation scores 0.0
    pub probability: f64,
    /// Binary call for the hour
    pub prediction: u8,
}

/// A contiguous window of hours with probability at or above the threshold
#[derive(Debug, Clone)]
pub struct PeakWindow {
    pub start_hour: usize,
    pub end_hour: usize,
    pub max_probability: f64,
    pub avg_probability: f64,
    pub duration: usize,
}

/// Aggregate statistics for a scored series
#[derive(Debug, Clone)]
pub struct SeriesSummary {
    pub max_probability: f64,
    /// Hour index with the highest probability
    pub peak_hour: usize,
    /// Hours with probability >= 0.4
    pub favorable_hours: usize,
    pub total_hours: usize,
}

/// Pure scoring engine for rainbow-sighting likelihood
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: FactorWeights,
    /// Advisory refresh interval reported as `next_update`, normally the
    /// current-weather cache TTL
    update_interval: Duration,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(Duration::seconds(300))
    }
}

impl ScoringEngine {
    /// Creates an engine that stamps `next_update` at the observation time
    /// plus the given interval
    pub fn new(update_interval: Duration) -> Self {
        Self {
            weights: FactorWeights::default(),
            update_interval,
        }
    }

    /// Scores an observation into a prediction result
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidObservation`] when a required field is
    /// outside its declared range; nothing else can fail.
    pub fn score(&self, observation: &WeatherObservation) -> Result<PredictionResult, ErrorKind> {
        validate(observation)?;

        let factors = self.factor_scores(observation);
        let probability = self.combine(&factors);
        let confidence = self.confidence(probability, &factors, observation);
        let prediction = u8::from(probability >= PREDICTION_THRESHOLD);

        debug!(
            probability,
            prediction,
            confidence = %confidence,
            "observation scored"
        );

        Ok(PredictionResult {
            probability,
            prediction,
            confidence,
            factors: factor_labels(observation),
            recommendation: recommendation(probability).to_string(),
            conditions: summarize_conditions(observation),
            next_update: observation.timestamp + self.update_interval,
        })
    }

    /// Scores a batch of observations, isolating per-item failures
    ///
    /// One malformed observation does not fail the batch; its slot carries
    /// the validation error instead.
    pub fn score_batch(
        &self,
        observations: &[WeatherObservation],
    ) -> Vec<Result<PredictionResult, ErrorKind>> {
        observations.iter().map(|obs| self.score(obs)).collect()
    }

    /// Scores an hour-indexed series of forecast observations and finds the
    /// windows worth watching
    ///
    /// Invalid observations score 0.0 rather than aborting the series, so a
    /// single bad forecast hour cannot hide an otherwise promising evening.
    pub fn score_series(&self, observations: &[WeatherObservation]) -> SeriesOutlook {
        let hourly: Vec<HourOutlook> = observations
            .iter()
            .enumerate()
            .map(|(hour, obs)| {
                let probability = self.score(obs).map(|r| r.probability).unwrap_or(0.0);
                HourOutlook {
                    hour,
                    probability,
                    prediction: u8::from(probability >= PREDICTION_THRESHOLD),
                }
            })
            .collect();

        let peak_windows = find_peak_windows(&hourly);
        let summary = summarize_series(&hourly);

        SeriesOutlook {
            hourly,
            peak_windows,
            summary,
        }
    }

    /// Computes the four normalized factor scores for an observation
    pub fn factor_scores(&self, observation: &WeatherObservation) -> FactorScores {
        FactorScores {
            temperature: score_temperature(observation.temperature),
            humidity: score_humidity(observation.humidity),
            wind: score_wind(observation.wind_speed),
            precipitation: score_precipitation(observation.precipitation),
        }
    }

    /// Weighted average of the factor scores; stays within [0, 1] because
    /// every factor does and the weights sum to 1
    fn combine(&self, factors: &FactorScores) -> f64 {
        let weighted = factors.temperature * self.weights.temperature
            + factors.humidity * self.weights.humidity
            + factors.wind * self.weights.wind
            + factors.precipitation * self.weights.precipitation;

        weighted.clamp(0.0, 1.0)
    }

    /// Derives the confidence band from factor agreement
    ///
    /// Extreme inputs always read as low confidence. Three or more factors
    /// scoring well and agreeing closely, with a strong overall probability,
    /// read as high. Wide disagreement among the factors reads as low;
    /// everything else is medium.
    fn confidence(
        &self,
        probability: f64,
        factors: &FactorScores,
        observation: &WeatherObservation,
    ) -> Confidence {
        if is_extreme(observation) {
            return Confidence::Low;
        }

        let scores = factors.as_array();
        let strong: Vec<f64> = scores.iter().copied().filter(|s| *s >= 0.6).collect();

        if strong.len() >= 3 && probability >= 0.6 && spread(&strong) <= 0.25 {
            return Confidence::High;
        }
        if spread(&scores) >= 0.6 {
            return Confidence::Low;
        }

        Confidence::Medium
    }
}

/// Spread between the highest and lowest score in a set
fn spread(scores: &[f64]) -> f64 {
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for &s in scores {
        min = min.min(s);
        max = max.max(s);
    }
    if scores.is_empty() {
        0.0
    } else {
        max - min
    }
}

/// Inputs far outside the scoring bands, where the piecewise model has
/// nothing useful to say
fn is_extreme(observation: &WeatherObservation) -> bool {
    observation.temperature < 0.0
        || observation.temperature > 40.0
        || observation.wind_speed > 15.0
        || observation.humidity < 10.0
        || observation.precipitation > 20.0
}

/// Temperature score: 1.0 in the 15-25 degree band, linear decay to zero
/// over 10 degrees on either side
fn score_temperature(temp: f64) -> f64 {
    if (15.0..=25.0).contains(&temp) {
        1.0
    } else if temp < 15.0 {
        ((temp - 5.0) / 10.0).clamp(0.0, 1.0)
    } else {
        ((35.0 - temp) / 10.0).clamp(0.0, 1.0)
    }
}

/// Humidity score: 1.0 in the 60-85% band, decaying to zero at 20% and at
/// saturation
fn score_humidity(humidity: f64) -> f64 {
    if (60.0..=85.0).contains(&humidity) {
        1.0
    } else if humidity < 60.0 {
        ((humidity - 20.0) / 40.0).clamp(0.0, 1.0)
    } else {
        ((100.0 - humidity) / 15.0).clamp(0.0, 1.0)
    }
}

/// Wind score: light wind (1-4 m/s) is ideal; still air keeps droplets from
/// dispersing cloud and scores 0.3, strong wind decays to zero at 12 m/s
fn score_wind(wind: f64) -> f64 {
    if (1.0..=4.0).contains(&wind) {
        1.0
    } else if wind < 1.0 {
        0.3 + 0.7 * wind.max(0.0)
    } else {
        ((12.0 - wind) / 8.0).clamp(0.0, 1.0)
    }
}

/// Precipitation score: light trailing rain (0.1-3 mm) is ideal; a dry sky
/// scores 0.3, heavy ongoing rain decays to zero at 10 mm
fn score_precipitation(precipitation: f64) -> f64 {
    if precipitation == 0.0 {
        0.3
    } else if precipitation < 0.1 {
        (0.3 + 7.0 * precipitation).clamp(0.0, 1.0)
    } else if precipitation <= 3.0 {
        1.0
    } else {
        ((10.0 - precipitation) / 7.0).clamp(0.0, 1.0)
    }
}

/// Qualitative labels per factor, derived from the same bands that produce
/// the numeric scores so the breakdown cannot contradict the probability
fn factor_labels(observation: &WeatherObservation) -> BTreeMap<String, String> {
    let temperature = match observation.temperature {
        t if t < 5.0 => "too_cold",
        t if t < 15.0 => "cool",
        t if t <= 25.0 => "optimal",
        t if t <= 35.0 => "warm",
        _ => "too_hot",
    };
    let humidity = match observation.humidity {
        h if h < 20.0 => "too_dry",
        h if h < 60.0 => "dry",
        h if h <= 85.0 => "optimal",
        _ => "very_humid",
    };
    let wind = match observation.wind_speed {
        w if w < 1.0 => "calm",
        w if w <= 4.0 => "favorable",
        w if w < 8.0 => "moderate",
        _ => "too_strong",
    };
    let precipitation = match observation.precipitation {
        p if p == 0.0 => "none",
        p if p <= 3.0 => "favorable",
        p if p < 10.0 => "moderate",
        _ => "too_heavy",
    };

    [
        ("temperature", temperature),
        ("humidity", humidity),
        ("wind", wind),
        ("precipitation", precipitation),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Recommendation text chosen by probability bucket
fn recommendation(probability: f64) -> &'static str {
    if probability >= 0.7 {
        "Great conditions for rainbow spotting. Head outside and watch the sky."
    } else if probability >= 0.3 {
        "Moderate chance of a rainbow. Keep an eye on the sky."
    } else {
        "Poor conditions for rainbows right now."
    }
}

/// Human-readable comma-separated summary of the observed conditions
pub fn summarize_conditions(observation: &WeatherObservation) -> String {
    let mut parts = Vec::with_capacity(4);

    parts.push(if observation.temperature < 10.0 {
        "cold"
    } else if observation.temperature > 25.0 {
        "warm"
    } else {
        "mild"
    });

    parts.push(if observation.humidity > 80.0 {
        "very humid"
    } else if observation.humidity > 60.0 {
        "humid"
    } else {
        "dry"
    });

    if observation.precipitation > 5.0 {
        parts.push("heavy rain");
    } else if observation.precipitation > 0.0 {
        parts.push("light rain");
    }

    parts.push(if observation.cloud_cover > 75.0 {
        "overcast"
    } else if observation.cloud_cover > 25.0 {
        "partly cloudy"
    } else {
        "clear"
    });

    parts.join(", ")
}

/// Validates the declared field ranges, naming the first offending field
fn validate(observation: &WeatherObservation) -> Result<(), ErrorKind> {
    let checks: [(&'static str, f64, bool); 6] = [
        (
            "temperature",
            observation.temperature,
            observation.temperature.is_finite()
                && (-90.0..=60.0).contains(&observation.temperature),
        ),
        (
            "humidity",
            observation.humidity,
            observation.humidity.is_finite() && (0.0..=100.0).contains(&observation.humidity),
        ),
        (
            "wind_speed",
            observation.wind_speed,
            observation.wind_speed.is_finite() && observation.wind_speed >= 0.0,
        ),
        (
            "precipitation",
            observation.precipitation,
            observation.precipitation.is_finite() && observation.precipitation >= 0.0,
        ),
        (
            "cloud_cover",
            observation.cloud_cover,
            observation.cloud_cover.is_finite() && (0.0..=100.0).contains(&observation.cloud_cover),
        ),
        (
            "visibility",
            observation.visibility,
            observation.visibility.is_finite() && observation.visibility >= 0.0,
        ),
    ];

    for (field, value, ok) in checks {
        if !ok {
            return Err(ErrorKind::InvalidObservation { field, value });
        }
    }

    if observation.wind_direction > 359 {
        return Err(ErrorKind::InvalidObservation {
            field: "wind_direction",
            value: f64::from(observation.wind_direction),
        });
    }

    Ok(())
}

/// Finds contiguous runs of hours at or above the prediction threshold
fn find_peak_windows(hourly: &[HourOutlook]) -> Vec<PeakWindow> {
    let mut windows = Vec::new();
    let mut run: Vec<&HourOutlook> = Vec::new();

    for hour in hourly {
        if hour.probability >= PREDICTION_THRESHOLD {
            run.push(hour);
            continue;
        }
        if !run.is_empty() {
            windows.push(close_window(&run));
            run.clear();
        }
    }
    if !run.is_empty() {
        windows.push(close_window(&run));
    }

    windows
}

fn close_window(run: &[&HourOutlook]) -> PeakWindow {
    let max_probability = run.iter().map(|h| h.probability).fold(0.0, f64::max);
    let avg_probability = run.iter().map(|h| h.probability).sum::<f64>() / run.len() as f64;

    PeakWindow {
        start_hour: run[0].hour,
        end_hour: run[run.len() - 1].hour,
        max_probability,
        avg_probability,
        duration: run.len(),
    }
}

fn summarize_series(hourly: &[HourOutlook]) -> SeriesSummary {
    let mut max_probability = 0.0;
    let mut peak_hour = 0;
    let mut favorable_hours = 0;

    for hour in hourly {
        if hour.probability > max_probability {
            max_probability = hour.probability;
            peak_hour = hour.hour;
        }
        if hour.probability >= 0.4 {
            favorable_hours += 1;
        }
    }

    SeriesSummary {
        max_probability,
        peak_hour,
        favorable_hours,
        total_hours: hourly.len(),
    }
}
