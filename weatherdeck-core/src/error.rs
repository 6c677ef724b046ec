//! Error taxonomy for the refresh engine.
//!
//! Only [`RefreshError`] reaches the presentation layer. Storage failures are
//! logged and swallowed, geocoding failures never leave the geocoder, and
//! cancellation is not an error at all.

use thiserror::Error;

/// Weather fetch failed.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("No weather API key configured")]
    MissingApiKey,

    #[error("Weather request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Weather request failed: {0}")]
    Transport(String),

    #[error("Failed to parse weather response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ProviderError::MissingApiKey => {
                "Weather API key is missing. Run `weatherdeck configure` first."
            }
            ProviderError::Status { status, .. } if *status == 400 => {
                "Location not found. Check the spelling and try again."
            }
            ProviderError::Status { status, .. } if *status == 401 || *status == 403 => {
                "Weather API key is invalid. Check settings."
            }
            ProviderError::Status { .. } => "Weather service error. Please try again.",
            ProviderError::Transport(_) => "Unable to reach the weather service.",
            ProviderError::Decode(_) => "Received an unexpected weather response.",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Device location lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location service unavailable")]
    Unavailable,

    #[error("Location request timed out")]
    Timeout,
}

impl GeolocationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            GeolocationError::PermissionDenied => {
                "Could not get your location. Check permissions or try again."
            }
            GeolocationError::Unavailable => "Geolocation is not available on this device.",
            GeolocationError::Timeout => "Getting your location took too long. Try again.",
        }
    }
}

/// Durable storage failed. Never fatal.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read `{key}`: {reason}")]
    Read { key: String, reason: String },

    #[error("Failed to write `{key}`: {reason}")]
    Write { key: String, reason: String },

    #[error("Failed to encode `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure reported to the presentation layer.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Geolocation(#[from] GeolocationError),
}

impl RefreshError {
    /// Short, non-technical text for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            RefreshError::Provider(e) => e.user_message(),
            RefreshError::Geolocation(e) => e.user_message(),
        }
    }
}
