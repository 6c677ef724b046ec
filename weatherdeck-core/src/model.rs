use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label of the geolocated slot. Never an ordinary place name.
pub const CURRENT_LOCATION: &str = "Current Location";

/// Older builds persisted this spelling; both normalize to the sentinel.
const LEGACY_CURRENT_LOCATION: &str = "Your Current Location";

/// Upper bound on the recents list.
pub const MAX_RECENTS: usize = 5;

/// Normalized form used for every city comparison.
pub fn city_key(city: &str) -> String {
    city.trim().to_lowercase()
}

/// True if `city` is any spelling of the current-location sentinel.
pub fn is_current_location_label(city: &str) -> bool {
    let key = city_key(city);
    key == city_key(CURRENT_LOCATION) || key == city_key(LEGACY_CURRENT_LOCATION)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// What the user asked to see.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    /// A typed or clicked place name.
    Place(String),
    /// The geolocated slot; coordinates are known once a lookup succeeded.
    CurrentLocation(Option<Coordinates>),
}

impl LocationQuery {
    /// Parse user input. Blank input yields `None`; any sentinel spelling maps
    /// to the current-location query.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else if is_current_location_label(trimmed) {
            Some(Self::CurrentLocation(None))
        } else {
            Some(Self::Place(trimmed.to_string()))
        }
    }

    pub fn is_current_location(&self) -> bool {
        matches!(self, Self::CurrentLocation(_))
    }
}

impl fmt::Display for LocationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Place(name) => f.write_str(name),
            Self::CurrentLocation(_) => f.write_str(CURRENT_LOCATION),
        }
    }
}

/// Request handed to a weather provider.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherRequest {
    Place(String),
    Coordinates(Coordinates),
    /// Let the provider locate the caller by IP address.
    AutoIp,
}

impl WeatherRequest {
    /// Provider query string (`q=` parameter).
    pub fn as_query(&self) -> String {
        match self {
            Self::Place(name) => name.clone(),
            Self::Coordinates(coords) => coords.to_string(),
            Self::AutoIp => "auto:ip".to_string(),
        }
    }
}

impl From<&LocationQuery> for WeatherRequest {
    fn from(query: &LocationQuery) -> Self {
        match query {
            LocationQuery::Place(name) => Self::Place(name.clone()),
            LocationQuery::CurrentLocation(Some(coords)) => Self::Coordinates(*coords),
            LocationQuery::CurrentLocation(None) => Self::AutoIp,
        }
    }
}

/// Place metadata returned alongside the weather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMeta {
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub tz_id: String,
    pub localtime: String,
}

impl LocationMeta {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temp_c: f64,
    pub temp_f: f64,
    pub feelslike_c: f64,
    pub condition: String,
    pub is_day: bool,
    pub humidity: u8,
    pub wind_kph: f64,
    pub uv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: String,
    pub maxtemp_c: f64,
    pub mintemp_c: f64,
    pub maxtemp_f: f64,
    pub mintemp_f: f64,
    pub chance_of_rain: u8,
    pub condition: String,
    /// Missing in records saved before it was tracked.
    #[serde(default)]
    pub astro: Astro,
}

/// Sunrise and sunset in the place's local time, as the provider writes
/// them (`"07:12 AM"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Astro {
    pub sunrise: String,
    pub sunset: String,
}

/// One provider response. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location: LocationMeta,
    pub current: CurrentConditions,
    pub forecast_day: ForecastDay,
}

const HOT_HIGH_F: f64 = 80.0;
const COLD_LOW_F: f64 = 30.0;
const HIGH_UV: f64 = 7.0;

impl WeatherSnapshot {
    /// Short tips for the day, from the current condition, the UV index and
    /// today's high and low. Never empty.
    pub fn recommendations(&self) -> Vec<&'static str> {
        const DEFAULT: &str = "Have a great day!";

        let condition = self.current.condition.trim().to_lowercase();
        if condition.is_empty() {
            return vec![DEFAULT];
        }

        let mut tips = Vec::new();
        if condition.contains("rain") {
            tips.push("Don't forget your umbrella! It's going to rain today.");
        }
        if self.forecast_day.maxtemp_f > HOT_HIGH_F {
            tips.push("It's going to be a hot day. Stay hydrated and wear sunglasses.");
        }
        if self.forecast_day.mintemp_f < COLD_LOW_F {
            tips.push("It's going to be a cold day. Bundle up and stay warm!");
        }
        if self.current.uv > HIGH_UV {
            tips.push("The UV index is high. Apply sunscreen and limit time outside.");
        }
        if tips.is_empty() {
            tips.push(DEFAULT);
        }
        tips
    }
}

/// Latest known state of one place.
///
/// Only `city`, `actualCityName`, `weatherSnapshot` and `lastUpdated` are
/// persisted; `needs_refresh` lives for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_city_name: Option<String>,
    pub weather_snapshot: WeatherSnapshot,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
    #[serde(skip)]
    pub needs_refresh: bool,
}

impl LocationRecord {
    pub fn is_current_location(&self) -> bool {
        is_current_location_label(&self.city)
    }

    pub fn matches_city(&self, city: &str) -> bool {
        city_key(&self.city) == city_key(city)
    }

    /// Label shown to the user: the resolved city name for the geolocated
    /// slot when known, otherwise `city`.
    pub fn display_name(&self) -> &str {
        match (&self.actual_city_name, self.is_current_location()) {
            (Some(name), true) if !name.trim().is_empty() => name,
            _ => &self.city,
        }
    }

    /// Equal up to `last_updated` and the session-only staleness flag.
    pub fn same_content(&self, other: &LocationRecord) -> bool {
        self.city == other.city
            && self.actual_city_name == other.actual_city_name
            && self.weather_snapshot == other.weather_snapshot
    }
}
