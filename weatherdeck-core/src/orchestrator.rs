//! Refresh orchestration.
//!
//! [`RefreshOrchestrator`] runs as a single tokio task that owns the
//! [`LocationStore`]. User commands, fetch completions, geolocation results
//! and scheduler ticks are all handled on that task, one at a time, so state
//! is only ever mutated from one place. Network work runs in spawned tasks
//! that report back over a channel; each carries a cancellation token and an
//! id, and a completion whose id is no longer the active fetch is dropped.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    cache::{self, Overrides},
    clock::{Clock, ClockEvent, ClockSource},
    error::{ProviderError, RefreshError},
    geocode::ReverseGeocoder,
    geolocation::{
        GEOLOCATION_COOLDOWN, GateOutcome, GateState, GeolocationGate, Geolocator,
        MAX_GEOLOCATION_COOLDOWN,
    },
    model::{LocationQuery, LocationRecord, WeatherRequest, WeatherSnapshot},
    provider::WeatherProvider,
    storage::KeyValueStore,
    store::LocationStore,
};

const COMMAND_BUFFER: usize = 32;

/// Bounds for the scheduler tick. Above a minute the `:00` check can be missed.
const MIN_TICK: Duration = Duration::from_millis(100);
const MAX_TICK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub geolocation_cooldown: Duration,
    /// Scheduler cadence; the hour-boundary check runs on every tick.
    pub tick_interval: Duration,
    /// Resolve a city name for the current-location slot.
    pub reverse_geocode: bool,
}

impl OrchestratorSettings {
    /// Settings with the tick and cooldown pulled into their supported range.
    pub fn clamped(self) -> Self {
        Self {
            geolocation_cooldown: self.geolocation_cooldown.min(MAX_GEOLOCATION_COOLDOWN),
            tick_interval: self.tick_interval.clamp(MIN_TICK, MAX_TICK),
            ..self
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            geolocation_cooldown: GEOLOCATION_COOLDOWN,
            tick_interval: Duration::from_secs(60),
            reverse_geocode: true,
        }
    }
}

/// External services the orchestrator talks to.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn WeatherProvider>,
    pub geocoder: Option<Arc<dyn ReverseGeocoder>>,
    pub geolocator: Arc<dyn Geolocator>,
    pub storage: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
}

/// What the presentation layer is told.
#[derive(Debug, Clone)]
pub enum Update {
    /// `record` is now the displayed location.
    Showing {
        record: LocationRecord,
        from_cache: bool,
    },
    Loading(bool),
    /// Transient failure; state was left untouched.
    Failed(RefreshError),
    LocationsChanged {
        current: Option<LocationRecord>,
        recents: Vec<LocationRecord>,
    },
    Geolocation(GateState),
}

/// Point-in-time copy of the dashboard state.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub current: Option<LocationRecord>,
    pub recents: Vec<LocationRecord>,
    pub selected: Option<LocationRecord>,
    pub active_query: Option<LocationQuery>,
    pub geolocation: GateState,
    pub loading: bool,
    pub visible: bool,
}

#[derive(Debug)]
enum Command {
    Select(LocationQuery),
    Locate,
    Refresh,
    Visibility(bool),
    View(oneshot::Sender<DashboardView>),
}

#[derive(Debug)]
enum Internal {
    Fetched {
        id: u64,
        query: LocationQuery,
        outcome: Result<(WeatherSnapshot, Option<String>), ProviderError>,
    },
    Located(GateOutcome),
    CooldownElapsed,
}

/// Why a dispatch happens; decides the override flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    QueryChanged,
    GeoOverride,
    HourBoundary,
}

impl Trigger {
    fn overrides(self, query: &LocationQuery) -> Overrides {
        Overrides {
            geo: self == Trigger::GeoOverride && query.is_current_location(),
            hour_boundary: self == Trigger::HourBoundary,
        }
    }
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    token: CancellationToken,
}

pub struct RefreshOrchestrator {
    store: LocationStore,
    clock: ClockSource,
    gate: Arc<GeolocationGate>,
    provider: Arc<dyn WeatherProvider>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    settings: OrchestratorSettings,
    active: Option<LocationQuery>,
    in_flight: Option<InFlight>,
    next_fetch_id: u64,
    last_fetched_at: Option<DateTime<Utc>>,
    updates: mpsc::UnboundedSender<Update>,
    internal: mpsc::UnboundedSender<Internal>,
    shutdown: CancellationToken,
}

impl RefreshOrchestrator {
    /// Load saved locations and start the orchestrator task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        collaborators: Collaborators,
        settings: OrchestratorSettings,
    ) -> (OrchestratorHandle, mpsc::UnboundedReceiver<Update>) {
        let settings = settings.clamped();
        let Collaborators {
            provider,
            geocoder,
            geolocator,
            storage,
            clock,
        } = collaborators;

        let (updates, updates_rx) = mpsc::unbounded_channel();
        let (internal, internal_rx) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let shutdown = CancellationToken::new();

        let store = LocationStore::load(storage);
        // Resume on the saved current location without a network call.
        let active = store.selected().map(|_| {
            LocationQuery::CurrentLocation(
                store
                    .current()
                    .map(|r| r.weather_snapshot.location.coordinates()),
            )
        });
        let last_fetched_at = store.selected().map(|r| r.last_updated);

        let orchestrator = RefreshOrchestrator {
            store,
            clock: ClockSource::new(clock),
            gate: Arc::new(GeolocationGate::new(
                geolocator,
                settings.geolocation_cooldown,
            )),
            provider,
            geocoder,
            settings,
            active,
            in_flight: None,
            next_fetch_id: 0,
            last_fetched_at,
            updates,
            internal,
            shutdown: shutdown.clone(),
        };

        let task = tokio::spawn(orchestrator.run(commands_rx, internal_rx));

        (
            OrchestratorHandle {
                commands,
                shutdown,
                task,
            },
            updates_rx,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = self.shutdown.clone();

        if let Some(record) = self.store.selected().cloned() {
            self.emit(Update::Showing {
                record,
                from_cache: true,
            });
        }
        self.emit_locations();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(message) = internal.recv() => self.handle_internal(message),
                _ = ticker.tick() => self.on_tick(),
            }
        }

        self.cancel_in_flight();
        self.store.save();
        shutdown.cancel();
        tracing::debug!("Refresh orchestrator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Select(query) => self.select(query),
            Command::Locate => self.locate(),
            Command::Refresh => {
                tracing::info!("Explicit refresh requested");
                self.dispatch(Trigger::HourBoundary);
            }
            Command::Visibility(visible) => self.on_visibility(visible),
            Command::View(reply) => {
                let _ = reply.send(self.view());
            }
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Fetched { id, query, outcome } => self.on_fetched(id, query, outcome),
            Internal::Located(outcome) => self.on_located(outcome),
            Internal::CooldownElapsed => self.emit(Update::Geolocation(self.gate.state())),
        }
    }

    fn select(&mut self, query: LocationQuery) {
        let query = match query {
            // Reuse the coordinates of the saved slot so a refetch asks for the same place.
            LocationQuery::CurrentLocation(None) => LocationQuery::CurrentLocation(
                self.store
                    .current()
                    .map(|r| r.weather_snapshot.location.coordinates()),
            ),
            other => other,
        };
        tracing::debug!(query = %query, "Query changed");
        self.active = Some(query);
        self.dispatch(Trigger::QueryChanged);
    }

    /// Decide between cache and network for the active query.
    fn dispatch(&mut self, trigger: Trigger) {
        let Some(query) = self.active.clone() else {
            return;
        };

        // Anything still in flight belongs to an older event.
        if self.cancel_in_flight() {
            self.emit(Update::Loading(false));
        }

        let now = self.clock.now();
        let cached = self.store.lookup(&query).cloned();
        let overrides = trigger.overrides(&query);

        if cache::should_use_cache(cached.as_ref(), overrides, now) {
            if let Some(record) = cached {
                tracing::debug!(query = %query, "Serving cached weather");
                self.show_cached(record);
            }
            return;
        }

        // Show what we have while the refresh runs.
        if trigger == Trigger::QueryChanged {
            if let Some(record) = cached {
                self.show_cached(record);
            }
        }

        self.start_fetch(query);
    }

    fn show_cached(&mut self, record: LocationRecord) {
        self.last_fetched_at = self.last_fetched_at.max(Some(record.last_updated));
        self.store.select_existing(record.clone());
        self.emit(Update::Showing {
            record,
            from_cache: true,
        });
    }

    fn start_fetch(&mut self, query: LocationQuery) {
        let id = self.next_fetch_id;
        self.next_fetch_id += 1;

        let token = self.shutdown.child_token();
        let provider = self.provider.clone();
        let geocoder = self
            .geocoder
            .clone()
            .filter(|_| self.settings.reverse_geocode && query.is_current_location());
        let internal = self.internal.clone();
        let task_token = token.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = task_token.cancelled() => return,
                outcome = fetch_weather(provider.as_ref(), geocoder.as_deref(), &query) => outcome,
            };
            if task_token.is_cancelled() {
                return;
            }
            let _ = internal.send(Internal::Fetched { id, query, outcome });
        });

        self.in_flight = Some(InFlight { id, token });
        self.emit(Update::Loading(true));
    }

    /// Returns true if a fetch was cancelled.
    fn cancel_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(in_flight) => {
                tracing::debug!(id = in_flight.id, "Cancelling in-flight fetch");
                in_flight.token.cancel();
                true
            }
            None => false,
        }
    }

    fn on_fetched(
        &mut self,
        id: u64,
        query: LocationQuery,
        outcome: Result<(WeatherSnapshot, Option<String>), ProviderError>,
    ) {
        if self.in_flight.as_ref().map(|f| f.id) != Some(id) {
            tracing::debug!(id, query = %query, "Ignoring superseded fetch result");
            return;
        }
        self.in_flight = None;
        self.emit(Update::Loading(false));

        match outcome {
            Ok((snapshot, resolved_name)) => {
                let now = self.clock.now();
                let record = self
                    .store
                    .record_fetch_result(&query, snapshot, resolved_name, now);
                self.last_fetched_at = Some(now);
                tracing::info!(city = %record.display_name(), "Weather updated");
                self.emit(Update::Showing {
                    record,
                    from_cache: false,
                });
                self.emit_locations();
            }
            Err(err) => {
                tracing::warn!(query = %query, "Weather fetch failed: {err}");
                self.emit(Update::Failed(err.into()));
            }
        }
    }

    fn locate(&mut self) {
        if let Err(outcome) = self.gate.try_claim() {
            self.on_located(outcome);
            return;
        }
        self.emit(Update::Geolocation(GateState::InFlight));

        let gate = self.gate.clone();
        let internal = self.internal.clone();
        let token = self.shutdown.child_token();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                outcome = gate.lookup() => {
                    let _ = internal.send(Internal::Located(outcome));
                }
            }
        });
    }

    fn on_located(&mut self, outcome: GateOutcome) {
        if outcome == GateOutcome::Dropped {
            return;
        }

        // Only a completed lookup cools the gate, so this runs once per lookup.
        let state = self.gate.state();
        if let GateState::Cooling { until } = state {
            self.schedule_cooldown_end(until);
        }

        match outcome {
            GateOutcome::Dropped => {}
            GateOutcome::Located(coords) => {
                self.emit(Update::Geolocation(state));
                self.active = Some(LocationQuery::CurrentLocation(Some(coords)));
                self.dispatch(Trigger::GeoOverride);
            }
            GateOutcome::Failed(err) => {
                self.emit(Update::Geolocation(state));
                self.emit(Update::Failed(err.into()));
            }
        }
    }

    fn schedule_cooldown_end(&self, until: tokio::time::Instant) {
        let internal = self.internal.clone();
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(until) => {
                    let _ = internal.send(Internal::CooldownElapsed);
                }
            }
        });
    }

    fn on_tick(&mut self) {
        if self.clock.on_tick() == ClockEvent::HourBoundary {
            tracing::info!("Hour boundary reached");
            self.dispatch(Trigger::HourBoundary);
        }
    }

    fn on_visibility(&mut self, visible: bool) {
        if self.clock.on_visibility(visible) != Some(ClockEvent::BecameVisible) {
            return;
        }

        let now = self.clock.now();
        if self.store.mark_stale(now) > 0 {
            self.emit_locations();
        }

        let stale = self
            .last_fetched_at
            .is_some_and(|last| cache::is_past_window(last, now));
        if stale {
            tracing::info!("Visible again after a long absence; refreshing");
            self.dispatch(Trigger::HourBoundary);
        }
    }

    fn view(&self) -> DashboardView {
        DashboardView {
            current: self.store.current().cloned(),
            recents: self.store.recents().to_vec(),
            selected: self.store.selected().cloned(),
            active_query: self.active.clone(),
            geolocation: self.gate.state(),
            loading: self.in_flight.is_some(),
            visible: self.clock.is_visible(),
        }
    }

    fn emit_locations(&self) {
        self.emit(Update::LocationsChanged {
            current: self.store.current().cloned(),
            recents: self.store.recents().to_vec(),
        });
    }

    fn emit(&self, update: Update) {
        // The UI may have gone away; state stays authoritative either way.
        let _ = self.updates.send(update);
    }
}

/// Provider call plus best-effort city resolution for the current location.
async fn fetch_weather(
    provider: &dyn WeatherProvider,
    geocoder: Option<&dyn ReverseGeocoder>,
    query: &LocationQuery,
) -> Result<(WeatherSnapshot, Option<String>), ProviderError> {
    let snapshot = provider.fetch(&WeatherRequest::from(query)).await?;

    let resolved = match (geocoder, query) {
        (Some(geocoder), LocationQuery::CurrentLocation(coords)) => {
            let coords = coords.unwrap_or_else(|| snapshot.location.coordinates());
            geocoder.resolve(coords).await
        }
        _ => None,
    };

    Ok((snapshot, resolved))
}

/// Sends commands to a running [`RefreshOrchestrator`].
#[derive(Debug)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Show `query`, from cache when fresh.
    pub async fn select(&self, query: LocationQuery) -> anyhow::Result<()> {
        self.send(Command::Select(query)).await
    }

    /// Parse free-text input; blank input is ignored.
    pub async fn search(&self, input: &str) -> anyhow::Result<()> {
        match LocationQuery::parse(input) {
            Some(query) => self.select(query).await,
            None => Ok(()),
        }
    }

    /// "Use my location": one device lookup, then a forced fetch.
    pub async fn locate(&self) -> anyhow::Result<()> {
        self.send(Command::Locate).await
    }

    /// Refetch the active query regardless of age.
    pub async fn refresh(&self) -> anyhow::Result<()> {
        self.send(Command::Refresh).await
    }

    pub async fn set_visible(&self, visible: bool) -> anyhow::Result<()> {
        self.send(Command::Visibility(visible)).await
    }

    pub async fn view(&self) -> anyhow::Result<DashboardView> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::View(reply)).await?;
        rx.await
            .map_err(|_| anyhow::anyhow!("Refresh orchestrator has stopped"))
    }

    /// Stop the scheduler and any in-flight work, and wait for the task.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        self.task.await?;
        Ok(())
    }

    async fn send(&self, command: Command) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("Refresh orchestrator has stopped"))
    }
}
