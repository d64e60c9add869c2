//! Request coordination for the prediction core
//!
//! Orchestrates a single request: rate-limit admission, cache-backed data
//! resolution, scoring, and mapping of every failure to a declared error
//! kind. The coordinator owns the only shared mutable state in the core
//! (the caches and the limiter) and is cheap to share behind an `Arc`.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::info;

use crate::cache::{CacheKey, CachedValue, FreshnessCache};
use crate::config::Config;
use crate::error::ErrorKind;
use crate::limiter::RateLimiter;
use crate::scoring::ScoringEngine;
use crate::store::SightingStore;
use crate::types::{PredictionResult, RadarPayload, StoredSighting, WeatherObservation};
use crate::upstream::WeatherProvider;

/// Point-in-time view of the core's shared state, for health reporting
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthSnapshot {
    /// Tracked current-weather cache keys
    pub weather_entries: usize,
    /// Tracked radar cache keys
    pub radar_entries: usize,
    /// Clients with a live rate-limit budget
    pub tracked_clients: usize,
}

/// Coordinates prediction, weather, radar, and history requests
pub struct RequestCoordinator<P, S> {
    limiter: RateLimiter,
    weather_cache: FreshnessCache<WeatherObservation>,
    radar_cache: FreshnessCache<RadarPayload>,
    provider: Arc<P>,
    store: Arc<S>,
    scorer: ScoringEngine,
}

impl<P, S> RequestCoordinator<P, S>
where
    P: WeatherProvider,
    S: SightingStore,
{
    /// Builds a coordinator from configuration plus its collaborators
    pub fn new(config: &Config, provider: P, store: S) -> Self {
        Self {
            limiter: RateLimiter::new(
                config.rate_capacity,
                config.refill_per_sec,
                config.client_idle_timeout,
            ),
            weather_cache: FreshnessCache::new(
                config.weather_ttl,
                config.stale_grace,
                config.cache_capacity,
            ),
            radar_cache: FreshnessCache::new(
                config.radar_ttl,
                config.stale_grace,
                config.cache_capacity,
            ),
            provider: Arc::new(provider),
            store: Arc::new(store),
            scorer: ScoringEngine::new(Duration::seconds(config.weather_ttl.as_secs() as i64)),
        }
    }

    /// Handles a rainbow prediction request
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::RateLimited`] when admission is refused
    /// - [`ErrorKind::UpstreamUnavailable`] when the fetch fails with no
    ///   usable stale value
    /// - [`ErrorKind::InvalidObservation`] when the provider data is out of
    ///   range
    pub async fn handle_prediction(
        &self,
        lat: f64,
        lon: f64,
        client_id: &str,
    ) -> Result<PredictionResult, ErrorKind> {
        let observation = self.resolve_current(lat, lon, client_id).await?;
        let result = self.scorer.score(&observation.data)?;

        info!(
            probability = result.probability,
            confidence = %result.confidence,
            "prediction served"
        );
        Ok(result)
    }

    /// Handles a current-weather request; the prediction path minus scoring
    pub async fn handle_current(
        &self,
        lat: f64,
        lon: f64,
        client_id: &str,
    ) -> Result<WeatherObservation, ErrorKind> {
        Ok(self.resolve_current(lat, lon, client_id).await?.data)
    }

    /// Handles a radar request; cache-backed, never scored
    pub async fn handle_radar(
        &self,
        lat: f64,
        lon: f64,
        client_id: &str,
    ) -> Result<RadarPayload, ErrorKind> {
        if !self.limiter.admit(client_id) {
            return Err(ErrorKind::RateLimited);
        }

        let provider = Arc::clone(&self.provider);
        let value = self
            .radar_cache
            .get(CacheKey::radar(lat, lon), async move {
                provider.fetch_radar(lat, lon).await
            })
            .await
            .map_err(ErrorKind::UpstreamUnavailable)?;

        Ok(value.data)
    }

    /// Handles a historical sighting lookup
    ///
    /// A plain lookup against the sighting store: no cache, no scoring. A
    /// date with nothing recorded is a not-found outcome (`Ok(None)`),
    /// never a cached or derived value.
    pub fn handle_history(
        &self,
        date: NaiveDate,
        client_id: &str,
    ) -> Result<Option<Vec<StoredSighting>>, ErrorKind> {
        if !self.limiter.admit(client_id) {
            return Err(ErrorKind::RateLimited);
        }

        let rows = self.store.sightings_on(date);
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }

    /// Reports the current size of the shared state
    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            weather_entries: self.weather_cache.len(),
            radar_entries: self.radar_cache.len(),
            tracked_clients: self.limiter.tracked_clients(),
        }
    }

    /// Admission plus cache-backed current-weather resolution
    async fn resolve_current(
        &self,
        lat: f64,
        lon: f64,
        client_id: &str,
    ) -> Result<CachedValue<WeatherObservation>, ErrorKind> {
        if !self.limiter.admit(client_id) {
            return Err(ErrorKind::RateLimited);
        }

        let provider = Arc::clone(&self.provider);
        self.weather_cache
            .get(CacheKey::current(lat, lon), async move {
                provider.fetch_current(lat, lon).await
            })
            .await
            .map_err(ErrorKind::UpstreamUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::Utc;

    use crate::store::MemorySightingStore;
    use crate::upstream::UpstreamError;

    /// Scripted provider: counts calls, optionally failing or returning an
    /// out-of-range observation
    struct ScriptedProvider {
        calls: AtomicUsize,
        failing: AtomicBool,
        humidity: f64,
    }

    impl ScriptedProvider {
        fn healthy() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                humidity: 75.0,
            }
        }

        fn with_humidity(humidity: f64) -> Self {
            Self {
                humidity,
                ..Self::healthy()
            }
        }

        fn observation(&self) -> WeatherObservation {
            WeatherObservation {
                temperature: 22.5,
                humidity: self.humidity,
                pressure: 1012.0,
                wind_speed: 3.5,
                wind_direction: 270,
                precipitation: 0.5,
                cloud_cover: 40.0,
                visibility: 10.0,
                uv_index: 4,
                description: "scattered clouds".to_string(),
                timestamp: Utc::now(),
            }
        }
    }

    impl WeatherProvider for ScriptedProvider {
        async fn fetch_current(
            &self,
            _lat: f64,
            _lon: f64,
        ) -> Result<WeatherObservation, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(UpstreamError::MissingField("main"));
            }
            Ok(self.observation())
        }

        async fn fetch_radar(&self, _lat: f64, _lon: f64) -> Result<RadarPayload, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(UpstreamError::MissingField("radar"));
            }
            Ok(RadarPayload {
                data: serde_json::json!({"tiles": ["t1", "t2"]}),
                fetched_at: Utc::now(),
            })
        }
    }

    fn coordinator(
        provider: ScriptedProvider,
    ) -> RequestCoordinator<ScriptedProvider, MemorySightingStore> {
        RequestCoordinator::new(&Config::default(), provider, MemorySightingStore::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_prediction_happy_path() {
        let coordinator = coordinator(ScriptedProvider::healthy());

        let result = coordinator
            .handle_prediction(36.11, 137.95, "client-a")
            .await
            .expect("prediction should succeed");

        assert!(result.probability >= 0.7);
        assert_eq!(result.prediction, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_predictions_hit_the_cache() {
        let coordinator = coordinator(ScriptedProvider::healthy());

        for _ in 0..3 {
            coordinator
                .handle_prediction(36.11, 137.95, "client-a")
                .await
                .expect("prediction should succeed");
        }

        assert_eq!(coordinator.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_request_is_rate_limited_before_fetching() {
        let config = Config {
            rate_capacity: 1.0,
            ..Config::default()
        };
        let coordinator = RequestCoordinator::new(
            &config,
            ScriptedProvider::healthy(),
            MemorySightingStore::new(),
        );

        coordinator
            .handle_prediction(36.11, 137.95, "client-a")
            .await
            .expect("first request fits the budget");

        let denied = coordinator
            .handle_prediction(36.11, 137.95, "client-a")
            .await;

        assert!(matches!(denied, Err(ErrorKind::RateLimited)));
        // The denied request never reached the provider
        assert_eq!(coordinator.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_failure_with_no_stale_value() {
        let provider = ScriptedProvider::healthy();
        provider.failing.store(true, Ordering::SeqCst);
        let coordinator = coordinator(provider);

        let result = coordinator
            .handle_prediction(36.11, 137.95, "client-a")
            .await;

        assert!(matches!(result, Err(ErrorKind::UpstreamUnavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fallback_keeps_serving_predictions() {
        let coordinator = coordinator(ScriptedProvider::healthy());

        coordinator
            .handle_prediction(36.11, 137.95, "client-a")
            .await
            .expect("initial fill");

        // Entry expires, provider goes down; the stale observation still
        // backs a successful prediction
        tokio::time::advance(tokio::time::Duration::from_secs(400)).await;
        coordinator.provider.failing.store(true, Ordering::SeqCst);

        let result = coordinator
            .handle_prediction(36.11, 137.95, "client-b")
            .await
            .expect("stale value should keep the endpoint alive");

        assert_eq!(result.prediction, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_observation_from_provider() {
        let coordinator = coordinator(ScriptedProvider::with_humidity(140.0));

        let result = coordinator
            .handle_prediction(36.11, 137.95, "client-a")
            .await;

        match result {
            Err(ErrorKind::InvalidObservation { field, .. }) => assert_eq!(field, "humidity"),
            other => panic!("Expected InvalidObservation, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_radar_request_is_cached_and_unscored() {
        let coordinator = coordinator(ScriptedProvider::healthy());

        let first = coordinator
            .handle_radar(36.11, 137.95, "client-a")
            .await
            .expect("radar fetch");
        let second = coordinator
            .handle_radar(36.11, 137.95, "client-a")
            .await
            .expect("radar from cache");

        assert_eq!(first.data, second.data);
        assert_eq!(coordinator.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_lookup_not_found() {
        let coordinator = coordinator(ScriptedProvider::healthy());
        let date = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();

        let outcome = coordinator
            .handle_history(date, "client-a")
            .expect("lookup should succeed");

        assert!(outcome.is_none(), "empty date is a not-found outcome");
        // The historical path bypasses the cache and the provider entirely
        assert_eq!(coordinator.provider.calls.load(Ordering::SeqCst), 0);
        assert!(coordinator.weather_cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_lookup_found() {
        let store = MemorySightingStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();
        store.insert(StoredSighting {
            id: 1,
            latitude: 36.11,
            longitude: 137.95,
            sighted_on: date,
            intensity: 9,
        });
        let coordinator =
            RequestCoordinator::new(&Config::default(), ScriptedProvider::healthy(), store);

        let outcome = coordinator
            .handle_history(date, "client-a")
            .expect("lookup should succeed");

        let rows = outcome.expect("date has sightings");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].intensity, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_snapshot_counts_shared_state() {
        let coordinator = coordinator(ScriptedProvider::healthy());

        coordinator
            .handle_prediction(36.11, 137.95, "client-a")
            .await
            .expect("prediction");
        coordinator
            .handle_radar(36.11, 137.95, "client-b")
            .await
            .expect("radar");

        let health = coordinator.health();
        assert_eq!(health.weather_entries, 1);
        assert_eq!(health.radar_entries, 1);
        assert_eq!(health.tracked_clients, 2);
    }
}
