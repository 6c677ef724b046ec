//! Reverse geocoding: turn coordinates into a city name.
//! Uses Nominatim (OpenStreetMap), no API key required.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::model::Coordinates;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("weatherdeck/", env!("CARGO_PKG_VERSION"));

/// Best-effort coordinate-to-city lookup. Failures resolve to `None`.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync + Debug {
    async fn resolve(&self, coords: Coordinates) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    base_url: String,
    client: Option<Client>,
}

impl NominatimGeocoder {
    pub fn new() -> Self {
        Self::with_base_url(NOMINATIM_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| tracing::warn!("Failed to create geocoding client: {e}"))
            .ok();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
}

impl NominatimAddress {
    /// City-level name, never a neighborhood.
    fn city_name(self) -> Option<String> {
        self.city
            .or(self.town)
            .or(self.village)
            .or(self.municipality)
            .or(self.county)
            .filter(|name| !name.trim().is_empty())
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn resolve(&self, coords: Coordinates) -> Option<String> {
        let client = self.client.as_ref()?;

        let response = match client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("lat", coords.lat.to_string()),
                ("lon", coords.lon.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Reverse geocode request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!("Reverse geocode returned status {}", response.status());
            return None;
        }

        let body: NominatimResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("Reverse geocode parse error: {}", e);
                return None;
            }
        };

        let name = body.address?.city_name()?;
        tracing::info!("Reverse geocoded to: {}", name);
        Some(name)
    }
}
