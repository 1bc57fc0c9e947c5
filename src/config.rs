// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! Configuration is stored as TOML through `confy`, either in the platform
//! config directory or at an explicit path. Every field has a serde default so
//! a partial file is enough; only the reference location is mandatory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use overhead_client::enrichment::OPENSKY_API_URL;
use overhead_client::{EnrichmentConfig, OverheadZone, TrackerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name used for the platform config directory.
pub const APP_NAME: &str = "overhead-tracker";

const CONFIG_NAME: &str = "config";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] confy::ConfyError),

    #[error("location.{0} must be set")]
    MissingLocation(&'static str),

    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("overhead_zone.min_altitude_m ({min}) is above max_altitude_m ({max})")]
    AltitudeBand { min: f64, max: f64 },
}

/// Reference point the zone is centered on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    /// Display name used in log output
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverheadZoneConfig {
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,

    #[serde(default = "default_min_altitude_m")]
    pub min_altitude_m: f64,

    /// Omit for no ceiling
    #[serde(default = "default_max_altitude_m")]
    pub max_altitude_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsbConfig {
    /// `http(s)://` URL or local path of `aircraft.json`
    #[serde(default = "default_data_source")]
    pub data_source: String,

    /// Seconds since last message before a report is dropped
    #[serde(default = "default_max_age")]
    pub max_age: f64,

    /// Seconds between ticks
    #[serde(default = "default_update_interval")]
    pub update_interval: f64,

    /// HTTP timeout for the feed, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// `opensky`, `adsbexchange` or `none`
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Seconds a lookup result stays cached
    #[serde(default = "default_cache_duration")]
    pub cache_duration: f64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    /// Minimum seconds between outbound lookups
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Seconds between status log lines, 0 disables them
    #[serde(default = "default_status_interval")]
    pub interval_seconds: u64,

    #[serde(default = "default_recent_arrivals")]
    pub recent_arrivals: usize,
}

/// Application configuration stored in TOML format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub overhead_zone: OverheadZoneConfig,

    #[serde(default)]
    pub adsb: AdsbConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub status: StatusConfig,
}

// Default value functions for serde
fn default_radius_km() -> f64 {
    3.0
}

fn default_min_altitude_m() -> f64 {
    500.0
}

#[allow(clippy::unnecessary_wraps, reason = "serde default for an Option field")]
fn default_max_altitude_m() -> Option<f64> {
    Some(12_000.0)
}

fn default_data_source() -> String {
    "http://localhost:8080/data/aircraft.json".to_string()
}

fn default_max_age() -> f64 {
    30.0
}

fn default_update_interval() -> f64 {
    2.0
}

fn default_request_timeout() -> f64 {
    10.0
}

fn default_provider() -> String {
    "opensky".to_string()
}

fn default_base_url() -> String {
    OPENSKY_API_URL.to_string()
}

fn default_cache_duration() -> f64 {
    300.0
}

fn default_min_request_interval() -> f64 {
    1.0
}

fn default_status_interval() -> u64 {
    60
}

fn default_recent_arrivals() -> usize {
    20
}

impl Default for OverheadZoneConfig {
    fn default() -> Self {
        Self {
            radius_km: default_radius_km(),
            min_altitude_m: default_min_altitude_m(),
            max_altitude_m: default_max_altitude_m(),
        }
    }
}

impl Default for AdsbConfig {
    fn default() -> Self {
        Self {
            data_source: default_data_source(),
            max_age: default_max_age(),
            update_interval: default_update_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            cache_duration: default_cache_duration(),
            request_timeout: default_request_timeout(),
            min_request_interval: default_min_request_interval(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_status_interval(),
            recent_arrivals: default_recent_arrivals(),
        }
    }
}

/// Strictly positive, finite number of seconds.
fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    let duration = if value > 0.0 {
        Duration::try_from_secs_f64(value).ok()
    } else {
        None
    };
    duration.ok_or(ConfigError::OutOfRange { field, value })
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

/// Zero or a positive, finite number of seconds that fits a `Duration`.
fn non_negative_seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    non_negative(field, value)
        .ok()
        .and_then(|value| Duration::try_from_secs_f64(value).ok())
        .ok_or(ConfigError::OutOfRange { field, value })
}

impl AppConfig {
    /// Load from `path`, or from the platform config directory when `None`.
    ///
    /// A missing file is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => confy::load_path(path)?,
            None => confy::load(APP_NAME, CONFIG_NAME)?,
        };
        Ok(config)
    }

    /// Get the config file path for display to user
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?)
    }

    /// Reference latitude and longitude, range checked.
    pub fn reference(&self) -> Result<(f64, f64), ConfigError> {
        let latitude = self
            .location
            .latitude
            .ok_or(ConfigError::MissingLocation("latitude"))?;
        let longitude = self
            .location
            .longitude
            .ok_or(ConfigError::MissingLocation("longitude"))?;

        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ConfigError::OutOfRange {
                field: "location.latitude",
                value: latitude,
            });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ConfigError::OutOfRange {
                field: "location.longitude",
                value: longitude,
            });
        }

        Ok((latitude, longitude))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_tracker_config().map(|_| ())
    }

    /// Convert to the library configuration, validating along the way.
    pub fn to_tracker_config(&self) -> Result<TrackerConfig, ConfigError> {
        let (latitude, longitude) = self.reference()?;

        let zone = &self.overhead_zone;
        if !(zone.radius_km.is_finite() && zone.radius_km > 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "overhead_zone.radius_km",
                value: zone.radius_km,
            });
        }
        non_negative("overhead_zone.min_altitude_m", zone.min_altitude_m)?;
        if let Some(max) = zone.max_altitude_m {
            non_negative("overhead_zone.max_altitude_m", max)?;
            if zone.min_altitude_m > max {
                return Err(ConfigError::AltitudeBand {
                    min: zone.min_altitude_m,
                    max,
                });
            }
        }

        let min_spacing = non_negative_seconds("api.min_request_interval", self.api.min_request_interval)?;

        Ok(TrackerConfig {
            data_source: self.adsb.data_source.clone(),
            max_age_secs: non_negative("adsb.max_age", self.adsb.max_age)?,
            feed_timeout: seconds("adsb.request_timeout", self.adsb.request_timeout)?,
            zone: OverheadZone {
                latitude,
                longitude,
                radius_km: zone.radius_km,
                min_altitude_m: zone.min_altitude_m,
                max_altitude_m: zone.max_altitude_m,
            },
            update_interval: seconds("adsb.update_interval", self.adsb.update_interval)?,
            enrichment: EnrichmentConfig {
                provider: self.api.provider.clone(),
                base_url: self.api.base_url.clone(),
                cache_ttl: seconds("api.cache_duration", self.api.cache_duration)?,
                request_timeout: seconds("api.request_timeout", self.api.request_timeout)?,
                min_request_spacing: min_spacing,
            },
            recent_capacity: self.status.recent_arrivals,
            ..TrackerConfig::default()
        })
    }

    /// Location name for log output, falling back to coordinates.
    #[must_use]
    pub fn location_label(&self) -> String {
        match (&self.location.name, self.location.latitude, self.location.longitude) {
            (Some(name), _, _) => name.clone(),
            (None, Some(lat), Some(lon)) => format!("{lat:.4}, {lon:.4}"),
            _ => "unknown location".to_string(),
        }
    }
}
