//! Device location lookup behind a cooldown gate.

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{error::GeolocationError, model::Coordinates};

/// Minimum spacing between two device lookups.
pub const GEOLOCATION_COOLDOWN: Duration = Duration::from_secs(60);

/// Longest cooldown a gate accepts.
pub const MAX_GEOLOCATION_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// One-shot device location capability.
#[async_trait]
pub trait Geolocator: Send + Sync + Debug {
    /// Whether the capability exists at all on this device.
    fn is_available(&self) -> bool;

    async fn get_once(&self) -> Result<Coordinates, GeolocationError>;
}

/// Geolocator backed by fixed, configured coordinates. With no coordinates
/// the capability is absent.
#[derive(Debug, Clone, Default)]
pub struct StaticGeolocator {
    coordinates: Option<Coordinates>,
}

impl StaticGeolocator {
    pub fn new(coordinates: Option<Coordinates>) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl Geolocator for StaticGeolocator {
    fn is_available(&self) -> bool {
        self.coordinates.is_some()
    }

    async fn get_once(&self) -> Result<Coordinates, GeolocationError> {
        self.coordinates.ok_or(GeolocationError::Unavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    InFlight,
    Cooling { until: Instant },
}

impl GateState {
    /// True when a `request()` would be dropped.
    pub fn is_busy(&self) -> bool {
        !matches!(self, GateState::Idle)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// Cooling or another lookup in flight; nothing happened.
    Dropped,
    Located(Coordinates),
    Failed(GeolocationError),
}

/// Throttles device lookups to one per cooldown period.
#[derive(Debug)]
pub struct GeolocationGate {
    locator: Arc<dyn Geolocator>,
    cooldown: Duration,
    state: Mutex<GateState>,
}

impl GeolocationGate {
    /// `cooldown` is capped at [`MAX_GEOLOCATION_COOLDOWN`].
    pub fn new(locator: Arc<dyn Geolocator>, cooldown: Duration) -> Self {
        Self {
            locator,
            cooldown: cooldown.min(MAX_GEOLOCATION_COOLDOWN),
            state: Mutex::new(GateState::Idle),
        }
    }

    /// Current state; an expired cooldown reads as `Idle`.
    pub fn state(&self) -> GateState {
        let mut state = self.state.lock();
        expire_cooldown(&mut state);
        *state
    }

    /// Claim the gate for one lookup. `Err` carries the outcome of a request
    /// that ends here: `Dropped` while busy, `Failed(Unavailable)` without a
    /// capability (the gate stays `Idle`).
    pub fn try_claim(&self) -> Result<(), GateOutcome> {
        let mut state = self.state.lock();
        expire_cooldown(&mut state);
        if state.is_busy() {
            tracing::debug!(state = ?*state, "Geolocation request dropped");
            return Err(GateOutcome::Dropped);
        }
        if !self.locator.is_available() {
            tracing::info!("Geolocation capability is not available");
            return Err(GateOutcome::Failed(GeolocationError::Unavailable));
        }
        *state = GateState::InFlight;
        Ok(())
    }

    /// Run the lookup claimed by [`try_claim`](Self::try_claim), then cool down.
    pub async fn lookup(&self) -> GateOutcome {
        let result = self.locator.get_once().await;

        let now = Instant::now();
        let until = now
            .checked_add(self.cooldown)
            .unwrap_or_else(|| now + GEOLOCATION_COOLDOWN);
        *self.state.lock() = GateState::Cooling { until };

        match result {
            Ok(coords) => {
                tracing::info!(%coords, "Device location acquired");
                GateOutcome::Located(coords)
            }
            Err(err) => {
                tracing::warn!("Device location lookup failed: {err}");
                GateOutcome::Failed(err)
            }
        }
    }

    /// Claim and look up in one go.
    pub async fn request(&self) -> GateOutcome {
        match self.try_claim() {
            Ok(()) => self.lookup().await,
            Err(outcome) => outcome,
        }
    }
}

fn expire_cooldown(state: &mut GateState) {
    if let GateState::Cooling { until } = *state {
        if Instant::now() >= until {
            *state = GateState::Idle;
        }
    }
}
