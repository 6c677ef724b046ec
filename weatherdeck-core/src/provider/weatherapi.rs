use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::ProviderError,
    model::{Astro, CurrentConditions, ForecastDay, LocationMeta, WeatherRequest, WeatherSnapshot},
    provider::truncate_body,
};

use super::WeatherProvider;

const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// WeatherAPI.com `forecast.json`, one day.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: &str) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    tz_id: String,
    #[serde(default)]
    localtime: String,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    temp_f: f64,
    feelslike_c: f64,
    is_day: u8,
    humidity: u8,
    wind_kph: f64,
    #[serde(default)]
    uv: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaDay {
    maxtemp_c: f64,
    mintemp_c: f64,
    maxtemp_f: f64,
    mintemp_f: f64,
    #[serde(default)]
    daily_chance_of_rain: u8,
    condition: WaCondition,
}

#[derive(Debug, Default, Deserialize)]
struct WaAstro {
    #[serde(default)]
    sunrise: String,
    #[serde(default)]
    sunset: String,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    date: String,
    day: WaDay,
    #[serde(default)]
    astro: WaAstro,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    location: WaLocation,
    current: WaCurrent,
    forecast: WaForecast,
}

impl TryFrom<WaForecastResponse> for WeatherSnapshot {
    type Error = ProviderError;

    fn try_from(parsed: WaForecastResponse) -> Result<Self, Self::Error> {
        let WaForecastResponse {
            location,
            current,
            forecast,
        } = parsed;

        let today = forecast.forecastday.into_iter().next().ok_or_else(|| {
            ProviderError::Decode("WeatherAPI response contained no forecastday data".into())
        })?;

        Ok(WeatherSnapshot {
            location: LocationMeta {
                name: location.name,
                region: location.region,
                country: location.country,
                lat: location.lat,
                lon: location.lon,
                tz_id: location.tz_id,
                localtime: location.localtime,
            },
            current: CurrentConditions {
                temp_c: current.temp_c,
                temp_f: current.temp_f,
                feelslike_c: current.feelslike_c,
                condition: current.condition.text,
                is_day: current.is_day != 0,
                humidity: current.humidity,
                wind_kph: current.wind_kph,
                uv: current.uv,
            },
            forecast_day: ForecastDay {
                date: today.date,
                maxtemp_c: today.day.maxtemp_c,
                mintemp_c: today.day.mintemp_c,
                maxtemp_f: today.day.maxtemp_f,
                mintemp_f: today.day.mintemp_f,
                chance_of_rain: today.day.daily_chance_of_rain,
                condition: today.day.condition.text,
                astro: Astro {
                    sunrise: today.astro.sunrise,
                    sunset: today.astro.sunset,
                },
            },
        })
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn fetch(&self, request: &WeatherRequest) -> Result<WeatherSnapshot, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let url = format!("{}/forecast.json", self.base_url);
        let q = request.as_query();

        tracing::info!(q = %q, "Fetching weather");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", q.as_str()),
                ("days", "1"),
                ("aqi", "no"),
                ("alerts", "no"),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: WaForecastResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Decode(format!("WeatherAPI forecast JSON: {e}")))?;

        parsed.try_into()
    }
}
