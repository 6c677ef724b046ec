use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::mpsc::UnboundedReceiver;
use weatherdeck_core::{
    Collaborators, Config, LocationRecord, OrchestratorHandle, RefreshError, RefreshOrchestrator,
    Update, WeatherProvider,
    clock::SystemClock,
    geocode::{NominatimGeocoder, ReverseGeocoder},
    geolocation::StaticGeolocator,
    provider::provider_from_config,
    storage::{FileStore, KeyValueStore},
};

pub fn storage_from_config(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let store = match &config.data_dir {
        Some(dir) => FileStore::new(dir),
        None => FileStore::in_default_location()?,
    };
    tracing::debug!(dir = %store.dir().display(), "Using saved-locations directory");
    Ok(Arc::new(store))
}

/// Wire the configured collaborators and start the orchestrator.
pub fn start(config: &Config) -> Result<(OrchestratorHandle, UnboundedReceiver<Update>)> {
    let provider: Arc<dyn WeatherProvider> = Arc::from(provider_from_config(config)?);

    let geocoder = config.geocode.enabled.then(|| {
        let geocoder = match config.geocode.base_url.as_deref() {
            Some(url) => NominatimGeocoder::with_base_url(url),
            None => NominatimGeocoder::new(),
        };
        Arc::new(geocoder) as Arc<dyn ReverseGeocoder>
    });

    let collaborators = Collaborators {
        provider,
        geocoder,
        geolocator: Arc::new(StaticGeolocator::new(config.geolocation.coordinates())),
        storage: storage_from_config(config)?,
        clock: Arc::new(SystemClock),
    };

    Ok(RefreshOrchestrator::spawn(
        collaborators,
        config.orchestrator_settings(),
    ))
}

/// Wait for the outcome of a one-shot request. With `accept_cached`, a
/// cached record counts when nothing is being fetched.
pub async fn settle(
    handle: &OrchestratorHandle,
    updates: &mut UnboundedReceiver<Update>,
    accept_cached: bool,
) -> Result<LocationRecord> {
    if accept_cached {
        let view = handle.view().await?;
        if let (false, Some(record)) = (view.loading, view.selected) {
            return Ok(record);
        }
    }

    while let Some(update) = updates.recv().await {
        match update {
            Update::Showing {
                record,
                from_cache: false,
            } => return Ok(record),
            Update::Failed(err) => return Err(surface(err)),
            _ => {}
        }
    }
    Err(anyhow!("Dashboard stopped before any weather arrived"))
}

/// User-facing message on top, technical cause underneath.
pub fn surface(err: RefreshError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}
