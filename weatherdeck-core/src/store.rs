//! Current-location slot, recents list and selection.
//!
//! [`LocationStore`] is the only writer of both persisted keys. It is owned by
//! the refresh orchestrator's task, so every merge sees the latest list no
//! matter how long the fetch that produced it took.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::{
    cache,
    error::StorageError,
    model::{
        CURRENT_LOCATION, LocationQuery, LocationRecord, MAX_RECENTS, WeatherSnapshot, city_key,
        is_current_location_label,
    },
    storage::KeyValueStore,
};

pub const CURRENT_LOCATION_KEY: &str = "currentLocation";
pub const RECENT_LOCATIONS_KEY: &str = "recentLocations";

#[derive(Debug)]
pub struct LocationStore {
    storage: Arc<dyn KeyValueStore>,
    current: Option<LocationRecord>,
    recents: Vec<LocationRecord>,
    selected: Option<LocationRecord>,
}

impl LocationStore {
    /// Load both keys. Missing or malformed data yields empty state; the
    /// selection starts on the persisted current location.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let current = read_json::<LocationRecord>(storage.as_ref(), CURRENT_LOCATION_KEY)
            .filter(|record| !record.city.trim().is_empty())
            .map(|mut record| {
                record.city = CURRENT_LOCATION.to_string();
                record
            });

        let recents = read_json::<Vec<LocationRecord>>(storage.as_ref(), RECENT_LOCATIONS_KEY)
            .map(sanitize_recents)
            .unwrap_or_default();

        tracing::debug!(
            has_current = current.is_some(),
            recents = recents.len(),
            "Loaded saved locations"
        );

        Self {
            storage,
            selected: current.clone(),
            current,
            recents,
        }
    }

    pub fn current(&self) -> Option<&LocationRecord> {
        self.current.as_ref()
    }

    pub fn recents(&self) -> &[LocationRecord] {
        &self.recents
    }

    pub fn selected(&self) -> Option<&LocationRecord> {
        self.selected.as_ref()
    }

    /// Cached record for `query`, if any.
    pub fn lookup(&self, query: &LocationQuery) -> Option<&LocationRecord> {
        match query {
            LocationQuery::CurrentLocation(_) => self.current.as_ref(),
            LocationQuery::Place(name) => self.recents.iter().find(|r| r.matches_city(name)),
        }
    }

    /// Build a record from a successful fetch and merge it in.
    ///
    /// `resolved_name` is the reverse-geocoded city for the current-location
    /// slot; it falls back to the provider's place name. It is ignored for
    /// ordinary places.
    pub fn record_fetch_result(
        &mut self,
        query: &LocationQuery,
        snapshot: WeatherSnapshot,
        resolved_name: Option<String>,
        now: DateTime<Utc>,
    ) -> LocationRecord {
        let record = match query {
            LocationQuery::CurrentLocation(_) => {
                let actual = resolved_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| snapshot.location.name.clone());
                LocationRecord {
                    city: CURRENT_LOCATION.to_string(),
                    actual_city_name: Some(actual).filter(|name| !name.trim().is_empty()),
                    weather_snapshot: snapshot,
                    last_updated: now,
                    needs_refresh: false,
                }
            }
            LocationQuery::Place(typed) => LocationRecord {
                city: place_label(&snapshot, typed),
                actual_city_name: None,
                weather_snapshot: snapshot,
                last_updated: now,
                needs_refresh: false,
            },
        };

        if query.is_current_location() {
            self.current = Some(record.clone());
            self.save_current();
        } else {
            merge_into_recents(&mut self.recents, record.clone());
            self.save_recents();
        }

        self.selected = Some(record.clone());
        record
    }

    /// Show a record without fetching.
    pub fn select_existing(&mut self, record: LocationRecord) {
        self.selected = Some(record);
    }

    /// Flag every record older than the fresh window. Returns how many
    /// records changed.
    pub fn mark_stale(&mut self, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for record in self.current.iter_mut().chain(self.recents.iter_mut()) {
            let stale = !cache::is_fresh(record.last_updated, now);
            if stale != record.needs_refresh {
                record.needs_refresh = stale;
                changed += 1;
            }
        }
        changed
    }

    /// Write both keys. Failures are logged; in-memory state stays authoritative.
    pub fn save(&self) {
        self.save_current();
        self.save_recents();
    }

    fn save_current(&self) {
        if let Some(current) = &self.current {
            log_write(write_json(self.storage.as_ref(), CURRENT_LOCATION_KEY, current));
        }
    }

    fn save_recents(&self) {
        let to_save: Vec<&LocationRecord> = self
            .recents
            .iter()
            .filter(|r| !r.is_current_location())
            .collect();
        log_write(write_json(self.storage.as_ref(), RECENT_LOCATIONS_KEY, &to_save));
    }
}

/// Replace a case-insensitive match in place, otherwise prepend; then cap
/// the list at [`MAX_RECENTS`], dropping from the tail.
pub fn merge_into_recents(recents: &mut Vec<LocationRecord>, record: LocationRecord) {
    if record.is_current_location() || record.city.trim().is_empty() {
        tracing::warn!(city = %record.city, "Refusing to add record to recents");
        return;
    }

    match recents.iter_mut().find(|r| r.matches_city(&record.city)) {
        Some(existing) => *existing = record,
        None => recents.insert(0, record),
    }
    recents.truncate(MAX_RECENTS);
}

/// Drop sentinel, blank and duplicate entries from persisted recents.
fn sanitize_recents(stored: Vec<LocationRecord>) -> Vec<LocationRecord> {
    let mut seen = HashSet::new();
    let mut recents: Vec<LocationRecord> = stored
        .into_iter()
        .filter(|r| !r.city.trim().is_empty() && !is_current_location_label(&r.city))
        .filter(|r| seen.insert(city_key(&r.city)))
        .collect();
    recents.truncate(MAX_RECENTS);
    recents
}

/// Provider's place name, or the typed query when that name is unusable.
fn place_label(snapshot: &WeatherSnapshot, typed: &str) -> String {
    let name = snapshot.location.name.trim();
    if name.is_empty() || is_current_location_label(name) {
        typed.trim().to_string()
    } else {
        name.to_string()
    }
}

fn read_json<T: DeserializeOwned>(storage: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(raw) => raw?,
        Err(err) => {
            tracing::warn!("{err}");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, "Discarding malformed saved data: {err}");
            None
        }
    }
}

fn write_json<T: serde::Serialize + ?Sized>(
    storage: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    storage.set(key, &json)
}

fn log_write(result: Result<(), StorageError>) {
    if let Err(err) = result {
        tracing::warn!("Could not save locations: {err}");
    }
}
