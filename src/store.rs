//! Sighting store collaborator seam
//!
//! Persistence of historical sightings lives outside this core; the
//! coordinator only consumes a plain lookup contract. The in-memory
//! implementation exists for tests and the one-shot CLI.

use std::collections::HashMap;

use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::types::StoredSighting;

/// Plain lookup contract over the external sighting persistence
///
/// The historical path never goes through the freshness cache or the
/// scoring engine; an absent date is a not-found outcome, never a derived
/// value.
pub trait SightingStore: Send + Sync {
    /// Returns every sighting recorded on the given date
    fn sightings_on(&self, date: NaiveDate) -> Vec<StoredSighting>;
}

/// In-memory sighting store
#[derive(Debug, Default)]
pub struct MemorySightingStore {
    rows: RwLock<HashMap<NaiveDate, Vec<StoredSighting>>>,
}

impl MemorySightingStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sighting under its date
    pub fn insert(&self, sighting: StoredSighting) {
        self.rows
            .write()
            .entry(sighting.sighted_on)
            .or_default()
            .push(sighting);
    }
}

impl SightingStore for MemorySightingStore {
    fn sightings_on(&self, date: NaiveDate) -> Vec<StoredSighting> {
        self.rows.read().get(&date).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(id: u64, date: NaiveDate) -> StoredSighting {
        StoredSighting {
            id,
            latitude: 36.1148,
            longitude: 137.9531,
            sighted_on: date,
            intensity: 7,
        }
    }

    #[test]
    fn test_lookup_returns_sightings_for_date() {
        let store = MemorySightingStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();

        store.insert(sighting(1, date));
        store.insert(sighting(2, date));

        let rows = store.sightings_on(date);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 1);
    }

    #[test]
    fn test_lookup_for_empty_date_returns_nothing() {
        let store = MemorySightingStore::new();
        let rows = store.sightings_on(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(rows.is_empty());
    }
}
