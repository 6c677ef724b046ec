use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::{
    geolocation::GEOLOCATION_COOLDOWN, model::Coordinates, orchestrator::OrchestratorSettings,
};

/// Environment variable that overrides the configured API key.
pub const API_KEY_ENV: &str = "WEATHERDECK_API_KEY";

/// Weather provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    /// Override of the provider endpoint, e.g. a local proxy.
    pub base_url: Option<String>,
}

/// Where "current location" is on a device without a location service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub cooldown_secs: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            cooldown_secs: GEOLOCATION_COOLDOWN.as_secs(),
        }
    }
}

impl GeolocationConfig {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates {
            lat: self.latitude?,
            lon: self.longitude?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Scheduler tick cadence; the hour check runs on every tick.
    pub tick_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { tick_secs: 60 }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [weather]
/// api_key = "..."
///
/// [geolocation]
/// latitude = 48.85
/// longitude = 2.35
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Directory for saved locations; the platform data dir when absent.
    pub data_dir: Option<PathBuf>,
    pub weather: WeatherConfig,
    pub geolocation: GeolocationConfig,
    pub geocode: GeocodeConfig,
    pub refresh: RefreshConfig,
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    /// `WEATHERDECK_API_KEY` takes precedence over the stored key.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            // First run: no config file, return empty.
            Self::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                cfg.set_api_key(key);
            }
        }

        Ok(cfg)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weatherdeck", "weatherdeck")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn api_key(&self) -> Option<&str> {
        self.weather
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.weather.api_key = Some(api_key);
    }

    pub fn set_coordinates(&mut self, coords: Option<Coordinates>) {
        self.geolocation.latitude = coords.map(|c| c.lat);
        self.geolocation.longitude = coords.map(|c| c.lon);
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            geolocation_cooldown: Duration::from_secs(self.geolocation.cooldown_secs),
            tick_interval: Duration::from_secs(self.refresh.tick_secs.max(1)),
            reverse_geocode: self.geocode.enabled,
        }
        .clamped()
    }
}
