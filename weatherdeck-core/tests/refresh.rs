//! Scenario tests for the refresh orchestrator.
//!
//! Time is paused: provider latency and the scheduler ticker run on tokio's
//! virtual clock, while the wall clock seen by the orchestrator is a
//! `ManualClock` moved by hand.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use weatherdeck_core::{
    Collaborators, Coordinates, GeolocationError, LocationQuery, LocationRecord, LocationStore,
    OrchestratorHandle, OrchestratorSettings, ProviderError, RefreshError, RefreshOrchestrator,
    Update, WeatherProvider, WeatherRequest, WeatherSnapshot,
    clock::ManualClock,
    geocode::ReverseGeocoder,
    geolocation::{GateState, StaticGeolocator},
    model::{Astro, CURRENT_LOCATION, CurrentConditions, ForecastDay, LocationMeta},
    storage::MemoryStore,
};

const LYON: Coordinates = Coordinates { lat: 45.76, lon: 4.84 };

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 10, 30, 0).unwrap()
}

fn snapshot(name: &str, temp_c: f64) -> WeatherSnapshot {
    WeatherSnapshot {
        location: LocationMeta {
            name: name.to_string(),
            region: String::new(),
            country: "France".to_string(),
            lat: LYON.lat,
            lon: LYON.lon,
            tz_id: "Europe/Paris".to_string(),
            localtime: "2026-10-18 12:30".to_string(),
        },
        current: CurrentConditions {
            temp_c,
            temp_f: temp_c * 9.0 / 5.0 + 32.0,
            feelslike_c: temp_c,
            condition: "Overcast".to_string(),
            is_day: true,
            humidity: 70,
            wind_kph: 8.0,
            uv: 1.0,
        },
        forecast_day: ForecastDay {
            date: "2026-10-18".to_string(),
            maxtemp_c: temp_c + 2.0,
            mintemp_c: temp_c - 4.0,
            maxtemp_f: 60.0,
            mintemp_f: 45.0,
            chance_of_rain: 40,
            condition: "Light rain".to_string(),
            astro: Astro::default(),
        },
    }
}

#[derive(Debug, Default)]
struct FakeProvider {
    calls: Mutex<Vec<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<bool>,
    failing_queries: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn calls_for(&self, q: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == q).count()
    }

    fn delay(&self, q: &str, delay: Duration) {
        self.delays.lock().insert(q.to_string(), delay);
    }

    fn fail(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    fn fail_for(&self, q: &str) {
        self.failing_queries.lock().push(q.to_string());
    }
}

#[async_trait]
impl WeatherProvider for FakeProvider {
    async fn fetch(&self, request: &WeatherRequest) -> Result<WeatherSnapshot, ProviderError> {
        let q = request.as_query();
        self.calls.lock().push(q.clone());
        let delay = self
            .delays
            .lock()
            .get(&q)
            .copied()
            .unwrap_or(Duration::from_millis(100));
        tokio::time::sleep(delay).await;

        if *self.failing.lock() || self.failing_queries.lock().contains(&q) {
            return Err(ProviderError::Status {
                status: 503,
                body: "down".into(),
            });
        }

        let name = match request {
            WeatherRequest::Place(name) => name.clone(),
            _ => "Villeurbanne".to_string(),
        };
        Ok(snapshot(&name, 12.0))
    }
}

#[derive(Debug)]
struct FakeGeocoder;

#[async_trait]
impl ReverseGeocoder for FakeGeocoder {
    async fn resolve(&self, _coords: Coordinates) -> Option<String> {
        Some("Lyon".to_string())
    }
}

struct Harness {
    handle: OrchestratorHandle,
    updates: UnboundedReceiver<Update>,
    provider: Arc<FakeProvider>,
    clock: ManualClock,
}

fn start(storage: MemoryStore, coords: Option<Coordinates>) -> Harness {
    start_with(storage, coords, OrchestratorSettings::default())
}

fn start_with(
    storage: MemoryStore,
    coords: Option<Coordinates>,
    settings: OrchestratorSettings,
) -> Harness {
    let provider = Arc::new(FakeProvider::default());
    let clock = ManualClock::new(t0());

    let (handle, updates) = RefreshOrchestrator::spawn(
        Collaborators {
            provider: provider.clone(),
            geocoder: Some(Arc::new(FakeGeocoder)),
            geolocator: Arc::new(StaticGeolocator::new(coords)),
            storage: Arc::new(storage),
            clock: Arc::new(clock.clone()),
        },
        settings,
    );

    Harness {
        handle,
        updates,
        provider,
        clock,
    }
}

/// Storage already holding `cities`, each fetched at `at`.
fn seeded(cities: &[&str], at: DateTime<Utc>) -> MemoryStore {
    let storage = MemoryStore::new();
    let mut store = LocationStore::load(Arc::new(storage.clone()));
    for city in cities {
        store.record_fetch_result(
            &LocationQuery::Place(city.to_string()),
            snapshot(city, 5.0),
            None,
            at,
        );
    }
    storage
}

async fn next_showing(updates: &mut UnboundedReceiver<Update>) -> (LocationRecord, bool) {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            match updates.recv().await {
                Some(Update::Showing { record, from_cache }) => return (record, from_cache),
                Some(_) => continue,
                None => panic!("orchestrator stopped"),
            }
        }
    })
    .await
    .expect("no Showing update")
}

async fn next_failure(updates: &mut UnboundedReceiver<Update>) -> RefreshError {
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            match updates.recv().await {
                Some(Update::Failed(err)) => return err,
                Some(_) => continue,
                None => panic!("orchestrator stopped"),
            }
        }
    })
    .await
    .expect("no Failed update")
}

fn drain(updates: &mut UnboundedReceiver<Update>) -> Vec<Update> {
    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
    seen
}

fn started_fetch(updates: &[Update]) -> bool {
    updates.iter().any(|u| matches!(u, Update::Loading(true)))
}

fn geolocation_states(updates: &[Update]) -> Vec<GateState> {
    updates
        .iter()
        .filter_map(|u| match u {
            Update::Geolocation(state) => Some(*state),
            _ => None,
        })
        .collect()
}

fn cities(records: &[LocationRecord]) -> Vec<&str> {
    records.iter().map(|r| r.city.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn fresh_cached_record_is_served_without_fetch() {
    let mut h = start(seeded(&["Paris"], t0() - chrono::Duration::minutes(10)), None);

    h.handle.search("  paris ").await.unwrap();
    h.handle.view().await.unwrap();

    let updates = drain(&mut h.updates);
    assert!(!started_fetch(&updates));
    assert!(updates.iter().any(|u| matches!(
        u,
        Update::Showing { record, from_cache: true } if record.city == "Paris"
    )));
    assert!(h.provider.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_cached_record_is_shown_then_refreshed() {
    let mut h = start(seeded(&["Paris"], t0() - chrono::Duration::hours(2)), None);

    h.handle.search("Paris").await.unwrap();

    let (cached, from_cache) = next_showing(&mut h.updates).await;
    assert!(from_cache);
    assert_eq!(cached.last_updated, t0() - chrono::Duration::hours(2));

    let (fresh, from_cache) = next_showing(&mut h.updates).await;
    assert!(!from_cache);
    assert_eq!(fresh.last_updated, t0());
    assert_eq!(h.provider.calls_for("Paris"), 1);
}

#[tokio::test(start_paused = true)]
async fn superseded_fetch_does_not_touch_state() {
    let mut h = start(MemoryStore::new(), None);
    h.provider.delay("London", Duration::from_secs(5));

    h.handle.search("London").await.unwrap();
    h.handle.search("Paris").await.unwrap();

    let (record, from_cache) = next_showing(&mut h.updates).await;
    assert_eq!(record.city, "Paris");
    assert!(!from_cache);

    // Well past London's latency.
    tokio::time::sleep(Duration::from_secs(10)).await;

    let view = h.handle.view().await.unwrap();
    assert_eq!(cities(&view.recents), ["Paris"]);
    assert_eq!(view.selected.unwrap().city, "Paris");
    assert!(!view.loading);
    assert!(drain(&mut h.updates).iter().all(|u| !matches!(
        u,
        Update::Showing { record, .. } if record.city == "London"
    )));
    assert_eq!(h.provider.calls_for("London"), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_failing_fetch_reports_nothing() {
    let mut h = start(MemoryStore::new(), None);
    h.provider.delay("London", Duration::from_secs(5));
    h.provider.fail_for("London");

    h.handle.search("London").await.unwrap();
    h.handle.search("Paris").await.unwrap();

    let (record, _) = next_showing(&mut h.updates).await;
    assert_eq!(record.city, "Paris");

    tokio::time::sleep(Duration::from_secs(10)).await;
    h.handle.view().await.unwrap();

    assert!(
        drain(&mut h.updates)
            .iter()
            .all(|u| !matches!(u, Update::Failed(_)))
    );
    assert_eq!(h.provider.calls_for("London"), 1);
}

#[tokio::test(start_paused = true)]
async fn hour_boundary_forces_one_refetch_of_fresh_data() {
    let mut h = start(MemoryStore::new(), None);

    h.handle.search("Paris").await.unwrap();
    let (_, from_cache) = next_showing(&mut h.updates).await;
    assert!(!from_cache);

    h.clock.set(Utc.with_ymd_and_hms(2026, 10, 18, 11, 0, 0).unwrap());
    let (record, from_cache) = next_showing(&mut h.updates).await;
    assert!(!from_cache);
    assert_eq!(record.city, "Paris");
    assert_eq!(h.provider.calls_for("Paris"), 2);

    // Further ticks within the same :00 minute do nothing.
    tokio::time::sleep(Duration::from_secs(180)).await;
    h.handle.view().await.unwrap();
    assert_eq!(h.provider.calls_for("Paris"), 2);
}

#[tokio::test(start_paused = true)]
async fn returning_after_long_absence_refreshes() {
    let mut h = start(MemoryStore::new(), None);

    h.handle.search("Paris").await.unwrap();
    next_showing(&mut h.updates).await;

    h.handle.set_visible(false).await.unwrap();
    h.clock.advance(chrono::Duration::hours(2));
    h.handle.set_visible(true).await.unwrap();

    let (record, from_cache) = next_showing(&mut h.updates).await;
    assert!(!from_cache);
    assert_eq!(record.last_updated, h.clock_now());
    assert_eq!(h.provider.calls_for("Paris"), 2);
}

#[tokio::test(start_paused = true)]
async fn returning_after_short_absence_does_not_refresh() {
    let mut h = start(MemoryStore::new(), None);

    h.handle.search("Paris").await.unwrap();
    next_showing(&mut h.updates).await;

    h.handle.set_visible(false).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(10));
    h.handle.set_visible(true).await.unwrap();
    h.handle.view().await.unwrap();

    assert!(!started_fetch(&drain(&mut h.updates)));
    assert_eq!(h.provider.calls_for("Paris"), 1);
}

#[tokio::test(start_paused = true)]
async fn returning_after_exactly_one_hour_does_not_refresh() {
    let mut h = start(MemoryStore::new(), None);

    h.handle.search("Paris").await.unwrap();
    next_showing(&mut h.updates).await;

    h.handle.set_visible(false).await.unwrap();
    assert!(!h.handle.view().await.unwrap().visible);
    h.clock.advance(chrono::Duration::hours(1));
    h.handle.set_visible(true).await.unwrap();

    let view = h.handle.view().await.unwrap();
    assert!(view.visible);
    assert!(!view.loading);
    assert_eq!(h.provider.calls_for("Paris"), 1);
}

#[tokio::test(start_paused = true)]
async fn locate_reports_gate_states_once_each() {
    let mut h = start(MemoryStore::new(), Some(LYON));
    h.handle.view().await.unwrap();
    drain(&mut h.updates);

    h.handle.locate().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.handle.view().await.unwrap();
    let updates = drain(&mut h.updates);
    assert!(updates.iter().any(|u| matches!(u, Update::Showing { .. })));
    let states = geolocation_states(&updates);
    assert_eq!(states.len(), 2);
    assert_eq!(states[0], GateState::InFlight);
    assert!(matches!(states[1], GateState::Cooling { .. }));

    // Presses during the cooldown neither report nor add timers.
    for _ in 0..3 {
        h.handle.locate().await.unwrap();
    }
    h.handle.view().await.unwrap();
    assert!(geolocation_states(&drain(&mut h.updates)).is_empty());

    tokio::time::sleep(Duration::from_secs(61)).await;
    h.handle.view().await.unwrap();
    assert_eq!(
        geolocation_states(&drain(&mut h.updates)),
        [GateState::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn zero_tick_interval_still_runs() {
    let settings = OrchestratorSettings {
        tick_interval: Duration::ZERO,
        ..OrchestratorSettings::default()
    };
    let mut h = start_with(MemoryStore::new(), None, settings);

    tokio::time::sleep(Duration::from_secs(5)).await;
    h.handle.search("Paris").await.unwrap();
    let (record, _) = next_showing(&mut h.updates).await;
    assert_eq!(record.city, "Paris");
}

#[tokio::test(start_paused = true)]
async fn huge_cooldown_does_not_wedge_the_gate() {
    let settings = OrchestratorSettings {
        geolocation_cooldown: Duration::MAX,
        ..OrchestratorSettings::default()
    };
    let mut h = start_with(MemoryStore::new(), Some(LYON), settings);

    h.handle.locate().await.unwrap();
    let (record, from_cache) = next_showing(&mut h.updates).await;
    assert!(!from_cache);
    assert_eq!(record.city, CURRENT_LOCATION);
    assert!(matches!(
        h.handle.view().await.unwrap().geolocation,
        GateState::Cooling { .. }
    ));

    tokio::time::sleep(Duration::from_secs(24 * 60 * 60 + 1)).await;
    assert_eq!(h.handle.view().await.unwrap().geolocation, GateState::Idle);

    h.handle.locate().await.unwrap();
    let (_, from_cache) = next_showing(&mut h.updates).await;
    assert!(!from_cache);
    assert_eq!(h.provider.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn locate_fills_current_slot_and_cools_down() {
    let mut h = start(seeded(&["Paris"], t0()), Some(LYON));

    h.handle.locate().await.unwrap();
    let (record, from_cache) = next_showing(&mut h.updates).await;
    assert!(!from_cache);
    assert_eq!(record.city, CURRENT_LOCATION);
    assert_eq!(record.actual_city_name.as_deref(), Some("Lyon"));
    assert_eq!(h.provider.calls(), ["45.76,4.84"]);

    let view = h.handle.view().await.unwrap();
    assert_eq!(cities(&view.recents), ["Paris"]);
    assert!(matches!(view.geolocation, GateState::Cooling { .. }));

    // Pressed again during the cooldown: nothing happens.
    h.handle.locate().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.handle.view().await.unwrap();
    assert!(!started_fetch(&drain(&mut h.updates)));
    assert_eq!(h.provider.calls().len(), 1);

    // After the cooldown the same fresh slot is refetched anyway.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.handle.view().await.unwrap().geolocation, GateState::Idle);
    h.handle.locate().await.unwrap();
    let (_, from_cache) = next_showing(&mut h.updates).await;
    assert!(!from_cache);
    assert_eq!(h.provider.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn locate_without_capability_reports_and_stays_idle() {
    let mut h = start(MemoryStore::new(), None);

    h.handle.locate().await.unwrap();
    let err = next_failure(&mut h.updates).await;
    assert!(matches!(
        err,
        RefreshError::Geolocation(GeolocationError::Unavailable)
    ));

    let view = h.handle.view().await.unwrap();
    assert_eq!(view.geolocation, GateState::Idle);
    assert!(view.current.is_none());
}

#[tokio::test(start_paused = true)]
async fn provider_failure_leaves_state_untouched() {
    let seeded_at = t0() - chrono::Duration::hours(3);
    let mut h = start(seeded(&["Paris", "Oslo"], seeded_at), None);
    h.provider.fail(true);

    h.handle.search("Paris").await.unwrap();
    let err = next_failure(&mut h.updates).await;
    assert!(matches!(
        err,
        RefreshError::Provider(ProviderError::Status { status: 503, .. })
    ));

    let view = h.handle.view().await.unwrap();
    assert_eq!(cities(&view.recents), ["Oslo", "Paris"]);
    assert!(view.recents.iter().all(|r| r.last_updated == seeded_at));
}

#[tokio::test(start_paused = true)]
async fn explicit_refresh_refetches_fresh_data() {
    let mut h = start(MemoryStore::new(), None);

    h.handle.search("Paris").await.unwrap();
    next_showing(&mut h.updates).await;

    h.handle.refresh().await.unwrap();
    let (_, from_cache) = next_showing(&mut h.updates).await;
    assert!(!from_cache);
    assert_eq!(h.provider.calls_for("Paris"), 2);
}

#[tokio::test(start_paused = true)]
async fn startup_resumes_saved_current_location_without_fetching() {
    let storage = MemoryStore::new();
    LocationStore::load(Arc::new(storage.clone())).record_fetch_result(
        &LocationQuery::CurrentLocation(Some(LYON)),
        snapshot("Villeurbanne", 9.0),
        Some("Lyon".to_string()),
        t0() - chrono::Duration::minutes(20),
    );

    let mut h = start(storage, Some(LYON));
    let (record, from_cache) = next_showing(&mut h.updates).await;
    assert!(from_cache);
    assert_eq!(record.display_name(), "Lyon");

    let view = h.handle.view().await.unwrap();
    assert_eq!(
        view.active_query,
        Some(LocationQuery::CurrentLocation(Some(LYON)))
    );
    assert!(h.provider.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_persists_locations() {
    let storage = MemoryStore::new();
    let mut h = start(storage.clone(), None);
    storage.fail_writes(true);

    h.handle.search("Paris").await.unwrap();
    next_showing(&mut h.updates).await;
    assert!(storage.value("recentLocations").is_none());

    storage.fail_writes(false);
    h.handle.shutdown().await.unwrap();

    let reloaded = LocationStore::load(Arc::new(storage));
    assert_eq!(cities(reloaded.recents()), ["Paris"]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_the_update_stream() {
    let mut h = start(MemoryStore::new(), None);
    h.handle.shutdown().await.unwrap();

    drain(&mut h.updates);
    assert!(h.updates.recv().await.is_none());
}

impl Harness {
    fn clock_now(&self) -> DateTime<Utc> {
        use weatherdeck_core::clock::Clock;
        self.clock.now()
    }
}
