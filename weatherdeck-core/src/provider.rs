use crate::{
    Config,
    error::ProviderError,
    model::{WeatherRequest, WeatherSnapshot},
    provider::weatherapi::WeatherApiProvider,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod weatherapi;

/// Remote weather service: current conditions plus a one-day forecast.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, request: &WeatherRequest) -> Result<WeatherSnapshot, ProviderError>;
}

/// Construct the configured provider.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let api_key = config.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No weather API key configured.\n\
             Hint: run `weatherdeck configure` or set WEATHERDECK_API_KEY."
        )
    })?;

    let provider = match config.weather.base_url.as_deref() {
        Some(base_url) => WeatherApiProvider::with_base_url(api_key, base_url),
        None => WeatherApiProvider::new(api_key),
    };

    Ok(Box::new(provider))
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn provider_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = provider_from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("No weather API key configured"));
    }

    #[test]
    fn provider_from_config_works_when_configured() {
        let mut cfg = Config::default();
        cfg.set_api_key("KEY".to_string());

        assert!(provider_from_config(&cfg).is_ok());
    }

    #[test]
    fn provider_from_config_honours_base_url_override() {
        let mut cfg = Config::default();
        cfg.set_api_key("KEY".to_string());
        cfg.weather.base_url = Some("http://127.0.0.1:8080/v1/".to_string());

        assert!(provider_from_config(&cfg).is_ok());
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let cut = truncate_body(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
