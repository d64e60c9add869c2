//! In-memory freshness cache with single-flight request collapsing
//!
//! Sits between the request coordinator and the upstream provider. Each key
//! holds at most one entry and at most one in-flight fetch: concurrent
//! callers for the same key attach to the in-flight work instead of issuing
//! duplicate upstream calls. When a refresh fails, an expired entry still
//! within the grace window is served stale rather than propagating the
//! failure.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::upstream::UpstreamError;

/// The kind of upstream data a cache entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Current weather observation
    Current,
    /// Raw radar payload
    Radar,
    /// Historical sightings, bucketed by date
    History(NaiveDate),
}

/// Cache key: data kind plus the location bucketed to two decimal places
///
/// Bucketing (~1 km) lets nearby coordinates share an entry, bounding cache
/// cardinality and raising the hit rate for geographically clustered
/// traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: DataKind,
    lat_bucket: i32,
    lon_bucket: i32,
}

impl CacheKey {
    /// Key for a current-weather lookup at the given coordinates
    pub fn current(lat: f64, lon: f64) -> Self {
        Self {
            kind: DataKind::Current,
            lat_bucket: bucket(lat),
            lon_bucket: bucket(lon),
        }
    }

    /// Key for a radar lookup at the given coordinates
    pub fn radar(lat: f64, lon: f64) -> Self {
        Self {
            kind: DataKind::Radar,
            lat_bucket: bucket(lat),
            lon_bucket: bucket(lon),
        }
    }

    /// Key for a historical lookup at the given coordinates and date
    pub fn history(lat: f64, lon: f64, date: NaiveDate) -> Self {
        Self {
            kind: DataKind::History(date),
            lat_bucket: bucket(lat),
            lon_bucket: bucket(lon),
        }
    }
}

/// Rounds a coordinate to a two-decimal bucket
fn bucket(coordinate: f64) -> i32 {
    (coordinate * 100.0).round() as i32
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DataKind::Current => "current".to_string(),
            DataKind::Radar => "radar".to_string(),
            DataKind::History(date) => format!("history:{}", date),
        };
        write!(
            f,
            "{}@{:.2},{:.2}",
            kind,
            f64::from(self.lat_bucket) / 100.0,
            f64::from(self.lon_bucket) / 100.0
        )
    }
}

/// How a cached value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from a fresh entry without touching the provider
    Fresh,
    /// Fetched from the provider on this call (or shared from the
    /// in-flight fetch this caller attached to)
    Refreshed,
    /// Refresh failed; an expired value within the grace window was served
    Stale,
}

/// A value handed out by the cache, with provenance
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    /// The cached data
    pub data: T,
    /// When the data was originally fetched
    pub fetched_at: DateTime<Utc>,
    /// How this value was obtained
    pub freshness: Freshness,
}

/// Stored entry for a single key
struct CacheEntry<T> {
    value: T,
    fetched_at: DateTime<Utc>,
    stored: Instant,
}

impl<T> CacheEntry<T> {
    fn age(&self) -> Duration {
        self.stored.elapsed()
    }
}

type InflightFuture<T> = Shared<BoxFuture<'static, Result<CachedValue<T>, Arc<UpstreamError>>>>;

/// Per-key slot: the entry plus at most one in-flight fetch
struct SlotState<T> {
    entry: Option<CacheEntry<T>>,
    inflight: Option<InflightFuture<T>>,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                entry: None,
                inflight: None,
            }),
        }
    }
}

/// Handle kept in the key registry; `last_access` drives LRU eviction
struct SlotHandle<T> {
    slot: Arc<Slot<T>>,
    last_access: Instant,
}

/// Per-key TTL cache with single-flight collapsing and stale-on-error
///
/// Generic over the fetched payload type. The registry lock is held only to
/// look up or insert a slot; all entry mutation happens under the per-key
/// slot lock so unrelated keys never serialize on each other.
pub struct FreshnessCache<T> {
    slots: Mutex<HashMap<CacheKey, SlotHandle<T>>>,
    ttl: Duration,
    grace: Duration,
    capacity: usize,
}

impl<T> FreshnessCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a cache with the given TTL, stale grace window, and capacity
    pub fn new(ttl: std::time::Duration, grace: std::time::Duration, capacity: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            grace,
            capacity: capacity.max(1),
        }
    }

    /// Resolves a key, fetching from the provider when needed
    ///
    /// The supplied future is polled only when this caller triggers the
    /// fetch; callers that find a fresh entry or an in-flight fetch drop it
    /// unpolled. All waiters of one in-flight fetch share its outcome,
    /// success or failure.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error only when no usable stale value exists.
    pub async fn get<F>(&self, key: CacheKey, fetch: F) -> Result<CachedValue<T>, Arc<UpstreamError>>
    where
        F: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        let slot = self.slot(&key);

        let shared = {
            let mut state = slot.state.lock();

            if let Some(entry) = &state.entry {
                if entry.age() <= self.ttl {
                    debug!(key = %key, "cache hit");
                    return Ok(CachedValue {
                        data: entry.value.clone(),
                        fetched_at: entry.fetched_at,
                        freshness: Freshness::Fresh,
                    });
                }
            }

            if let Some(inflight) = &state.inflight {
                debug!(key = %key, "joining in-flight fetch");
                inflight.clone()
            } else {
                debug!(key = %key, "cache miss, fetching upstream");
                let fut = self.spawn_fetch(&slot, key.clone(), fetch);
                state.inflight = Some(fut.clone());
                fut
            }
        };

        shared.await
    }

    /// Builds the single-flight future for a key and spawns a driver task
    /// so the fetch completes even if every interested caller goes away
    fn spawn_fetch<F>(&self, slot: &Arc<Slot<T>>, key: CacheKey, fetch: F) -> InflightFuture<T>
    where
        F: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        let slot = Arc::clone(slot);
        let horizon = self.ttl + self.grace;

        let fut = async move {
            let result = fetch.await;
            let mut state = slot.state.lock();
            state.inflight = None;

            match result {
                Ok(value) => {
                    let fetched_at = Utc::now();
                    state.entry = Some(CacheEntry {
                        value: value.clone(),
                        fetched_at,
                        stored: Instant::now(),
                    });
                    Ok(CachedValue {
                        data: value,
                        fetched_at,
                        freshness: Freshness::Refreshed,
                    })
                }
                Err(err) => {
                    if let Some(entry) = &state.entry {
                        if entry.age() <= horizon {
                            warn!(key = %key, error = %err, "upstream fetch failed, serving stale value");
                            return Ok(CachedValue {
                                data: entry.value.clone(),
                                fetched_at: entry.fetched_at,
                                freshness: Freshness::Stale,
                            });
                        }
                    }
                    state.entry = None;
                    Err(Arc::new(err))
                }
            }
        }
        .boxed()
        .shared();

        tokio::spawn(fut.clone());
        fut
    }

    /// Looks up or creates the slot for a key, touching its LRU stamp
    fn slot(&self, key: &CacheKey) -> Arc<Slot<T>> {
        let mut slots = self.slots.lock();
        let now = Instant::now();

        if let Some(handle) = slots.get_mut(key) {
            handle.last_access = now;
            return Arc::clone(&handle.slot);
        }

        if slots.len() >= self.capacity {
            self.evict(&mut slots);
        }

        let slot = Arc::new(Slot::default());
        slots.insert(
            key.clone(),
            SlotHandle {
                slot: Arc::clone(&slot),
                last_access: now,
            },
        );
        slot
    }

    /// Drops entries past TTL + grace, then least-recently-used entries
    /// until under capacity. Slots with an in-flight fetch (or a live
    /// outside reference) are never evicted.
    fn evict(&self, slots: &mut HashMap<CacheKey, SlotHandle<T>>) {
        let horizon = self.ttl + self.grace;

        slots.retain(|_, handle| {
            if Arc::strong_count(&handle.slot) > 1 {
                return true;
            }
            match handle.slot.state.try_lock() {
                Some(state) => {
                    state.inflight.is_some()
                        || state.entry.as_ref().is_some_and(|e| e.age() <= horizon)
                }
                None => true,
            }
        });

        while slots.len() >= self.capacity {
            let victim = slots
                .iter()
                .filter(|(_, handle)| {
                    Arc::strong_count(&handle.slot) == 1
                        && handle
                            .slot
                            .state
                            .try_lock()
                            .is_some_and(|s| s.inflight.is_none())
                })
                .min_by_key(|(_, handle)| handle.last_access)
                .map(|(key, _)| key.clone());

            match victim {
                Some(key) => {
                    slots.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// True when no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
