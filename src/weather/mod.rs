//! Weather data model and upstream payload normalization.
//!
//! Two providers are supported: Open-Meteo (free, default) and
//! OpenWeatherMap (used when a key is configured). Their payloads differ;
//! both are normalized into one [`WeatherSnapshot`].

pub mod refresher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::GpsFix;

pub use refresher::WeatherRefresher;

/// Snapshots older than this are treated as absent.
pub const MAX_SNAPSHOT_AGE_SECS: i64 = 60 * 60;

/// Weather-related errors. All of them are recovered inside the refresh
/// loop; none escapes the engine.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Canonical wind observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    /// Wind speed in m/s.
    pub wind_speed: f64,
    /// Meteorological wind direction in degrees: where the wind blows FROM.
    pub wind_direction: f64,
    /// Observation time, unix seconds.
    pub observed_at: i64,
    /// Position the observation was fetched for.
    pub latitude: f64,
    pub longitude: f64,
}

impl WeatherSnapshot {
    /// Whether the observation is older than [`MAX_SNAPSHOT_AGE_SECS`].
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() - self.observed_at > MAX_SNAPSHOT_AGE_SECS
    }
}

/// Fetch statistics, persisted for the diagnostics screen. Never gates
/// behavior.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStats {
    /// Unix seconds of the last successful fetch.
    #[serde(default)]
    pub last_success_at: Option<i64>,
    /// Position of the last successful fetch.
    #[serde(default)]
    pub last_success_position: Option<GpsFix>,
    /// Unix seconds of the last failed fetch.
    #[serde(default)]
    pub last_failure_at: Option<i64>,
}

/// Open-Meteo current-weather payload (the fields we read).
#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    latitude: f64,
    longitude: f64,
    current: OpenMeteoCurrent,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoCurrent {
    #[serde(rename = "wind_speed_10m")]
    wind_speed: f64,
    #[serde(rename = "wind_direction_10m")]
    wind_direction: f64,
    /// Unix seconds (the request asks for `timeformat=unixtime`).
    time: i64,
}

/// OpenWeatherMap current-weather payload (the fields we read).
#[derive(Debug, Deserialize)]
struct OpenWeatherResponse {
    coord: OwmCoord,
    wind: OwmWind,
    /// Observation time, unix seconds.
    dt: i64,
}

#[derive(Debug, Deserialize)]
struct OwmCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    /// m/s in the default OpenWeatherMap unit system.
    speed: f64,
    #[serde(default)]
    deg: f64,
}

/// Detect which provider produced `body` and normalize it.
///
/// Open-Meteo payloads carry a top-level `current` object; anything else
/// is tried as an OpenWeatherMap payload.
pub fn parse_weather_response(body: &str) -> Result<WeatherSnapshot, WeatherError> {
    if body.contains("\"current\"") {
        let decoded: OpenMeteoResponse =
            serde_json::from_str(body).map_err(|e| WeatherError::InvalidResponse(e.to_string()))?;

        Ok(WeatherSnapshot {
            wind_speed: decoded.current.wind_speed,
            wind_direction: decoded.current.wind_direction,
            observed_at: decoded.current.time,
            latitude: decoded.latitude,
            longitude: decoded.longitude,
        })
    } else {
        let decoded: OpenWeatherResponse =
            serde_json::from_str(body).map_err(|e| WeatherError::InvalidResponse(e.to_string()))?;

        Ok(WeatherSnapshot {
            wind_speed: decoded.wind.speed,
            wind_direction: decoded.wind.deg,
            observed_at: decoded.dt,
            latitude: decoded.coord.lat,
            longitude: decoded.coord.lon,
        })
    }
}

/// Build the provider-specific request URL.
///
/// The keyed commercial provider is only chosen when it is both enabled
/// and actually configured with a non-blank key.
pub fn request_url(fix: &GpsFix, use_open_weather: bool, api_key: &str) -> String {
    if use_open_weather && !api_key.trim().is_empty() {
        format!(
            "https://api.openweathermap.org/data/2.5/weather?lat={}&lon={}&appid={}",
            fix.lat,
            fix.lon,
            api_key.trim()
        )
    } else {
        format!(
            "https://api.open-meteo.com/v1/forecast?latitude={}&longitude={}&current=wind_speed_10m,wind_direction_10m&timeformat=unixtime&wind_speed_unit=ms",
            fix.lat, fix.lon
        )
    }
}
