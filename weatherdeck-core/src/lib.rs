//! Core library for the `weatherdeck` dashboard.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The location store: current-location slot, bounded recents, selection
//! - Cache freshness decisions and the geolocation cooldown gate
//! - The refresh orchestrator that ties them to the weather provider
//!
//! It is used by `weatherdeck-cli`, but can also be driven by any other front end.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod geocode;
pub mod geolocation;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod storage;
pub mod store;

pub use config::Config;
pub use error::{GeolocationError, ProviderError, RefreshError, StorageError};
pub use model::{Coordinates, LocationQuery, LocationRecord, WeatherRequest, WeatherSnapshot};
pub use orchestrator::{
    Collaborators, DashboardView, OrchestratorHandle, OrchestratorSettings, RefreshOrchestrator,
    Update,
};
pub use provider::WeatherProvider;
pub use store::LocationStore;
