//! Runtime configuration for the prediction core
//!
//! Every knob has a default suitable for development; `from_env` applies
//! environment overrides. Invalid values fall back to the default rather
//! than aborting startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the prediction core and its collaborators
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the upstream weather provider
    pub upstream_base_url: String,
    /// API key for the upstream provider
    pub upstream_api_key: String,
    /// Bounded timeout applied to every upstream request
    pub request_timeout: Duration,
    /// TTL for cached current-weather observations
    pub weather_ttl: Duration,
    /// TTL for cached radar payloads
    pub radar_ttl: Duration,
    /// Grace window beyond the TTL during which a stale value may be
    /// served when a refresh fails
    pub stale_grace: Duration,
    /// Maximum number of cache entries per data kind
    pub cache_capacity: usize,
    /// Token bucket capacity per client
    pub rate_capacity: f64,
    /// Token refill rate per client, in tokens per second
    pub refill_per_sec: f64,
    /// Client budgets idle for longer than this are evicted
    pub client_idle_timeout: Duration,
    /// Whether error payloads may include internal diagnostic detail
    pub development: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            upstream_api_key: String::new(),
            request_timeout: Duration::from_secs(10),
            weather_ttl: Duration::from_secs(300), // 5 minutes
            radar_ttl: Duration::from_secs(120),   // 2 minutes
            stale_grace: Duration::from_secs(600), // 10 minutes
            cache_capacity: 1024,
            rate_capacity: 5.0,
            refill_per_sec: 1.0,
            client_idle_timeout: Duration::from_secs(900), // 15 minutes
            development: false,
        }
    }
}

impl Config {
    /// Builds a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            upstream_base_url: env::var("WEATHER_API_URL").unwrap_or(defaults.upstream_base_url),
            upstream_api_key: env::var("WEATHER_API_KEY").unwrap_or(defaults.upstream_api_key),
            request_timeout: env_secs("UPSTREAM_TIMEOUT_SECS", defaults.request_timeout),
            weather_ttl: env_secs("WEATHER_CACHE_TTL", defaults.weather_ttl),
            radar_ttl: env_secs("RADAR_CACHE_TTL", defaults.radar_ttl),
            stale_grace: env_secs("STALE_GRACE_SECS", defaults.stale_grace),
            cache_capacity: env_parse("CACHE_CAPACITY", defaults.cache_capacity),
            rate_capacity: env_parse("RATE_LIMIT_CAPACITY", defaults.rate_capacity),
            refill_per_sec: env_parse("RATE_LIMIT_REFILL", defaults.refill_per_sec),
            client_idle_timeout: env_secs("CLIENT_IDLE_SECS", defaults.client_idle_timeout),
            development: env::var("RAINBOWCAST_ENV")
                .map(|v| v.eq_ignore_ascii_case("development"))
                .unwrap_or(defaults.development),
        }
    }
}

/// Parses an environment variable, returning the default when unset or invalid
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable holding whole seconds into a Duration
fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.weather_ttl, Duration::from_secs(300));
        assert_eq!(config.radar_ttl, Duration::from_secs(120));
        assert_eq!(config.stale_grace, Duration::from_secs(600));
        assert_eq!(config.cache_capacity, 1024);
        assert!((config.rate_capacity - 5.0).abs() < f64::EPSILON);
        assert!((config.refill_per_sec - 1.0).abs() < f64::EPSILON);
        assert!(!config.development);
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        // Unset variables use the default
        assert_eq!(env_parse("RAINBOWCAST_TEST_UNSET_VAR", 42usize), 42);
    }

    #[test]
    fn test_env_secs_falls_back_on_unset() {
        let default = Duration::from_secs(7);
        assert_eq!(env_secs("RAINBOWCAST_TEST_UNSET_SECS", default), default);
    }
}
