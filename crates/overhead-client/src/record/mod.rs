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

//! Normalized aircraft position records.
//!
//! A [`PositionRecord`] is rebuilt from the feed on every tick. Only its
//! identity outlives the tick, as the key for arrival detection and for the
//! enrichment cache.

use serde::Serialize;

/// Route and origin data merged onto a record by the enrichment cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Enrichment {
    /// Flight number (usually the callsign reported by the provider).
    pub flight_number: Option<String>,
    /// Country the aircraft is registered in or departed from.
    pub origin_country: Option<String>,
    pub destination_country: Option<String>,
    pub origin_airport: Option<String>,
    pub destination_airport: Option<String>,
}

impl Enrichment {
    /// True when no field has been populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flight_number.is_none()
            && self.origin_country.is_none()
            && self.destination_country.is_none()
            && self.origin_airport.is_none()
            && self.destination_airport.is_none()
    }
}

/// One observed aircraft at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRecord {
    /// ICAO 24-bit address (hex string).
    pub identity: String,
    /// Trimmed callsign, `None` when absent or blank.
    pub callsign: Option<String>,
    /// Latitude in degrees. Present if and only if `longitude` is.
    pub latitude: Option<f64>,
    /// Longitude in degrees. Present if and only if `latitude` is.
    pub longitude: Option<f64>,
    /// Barometric altitude in feet.
    pub altitude: Option<f64>,
    /// Ground speed in knots.
    pub ground_speed: Option<f64>,
    /// Track angle in degrees (0-360, north = 0).
    pub track_degrees: Option<f64>,
    /// Vertical rate in feet per minute.
    pub vertical_rate: Option<f64>,
    /// Seconds since the source last heard from this aircraft.
    pub age_seconds: f64,
    /// Filled in by the enrichment cache, empty until then.
    pub enrichment: Enrichment,
}

impl PositionRecord {
    /// Create a record with only an identity set.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            callsign: None,
            latitude: None,
            longitude: None,
            altitude: None,
            ground_speed: None,
            track_degrees: None,
            vertical_rate: None,
            age_seconds: 0.0,
            enrichment: Enrichment::default(),
        }
    }

    /// Set the position, keeping both coordinates together.
    #[must_use]
    pub fn with_position(mut self, latitude: f64, longitude: f64, altitude: Option<f64>) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self.altitude = altitude;
        self
    }

    #[must_use]
    pub fn with_age(mut self, age_seconds: f64) -> Self {
        self.age_seconds = age_seconds;
        self
    }

    /// True when latitude, longitude and altitude are all known.
    #[must_use]
    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some() && self.altitude.is_some()
    }

    /// Coordinates as a pair, if both are known.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Callsign if known, otherwise the identity.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.callsign.as_deref().unwrap_or(&self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_position_requires_altitude() {
        let record = PositionRecord::new("7C6B2D").with_position(-37.8, 144.9, None);
        assert!(!record.has_position());

        let record = record.with_position(-37.8, 144.9, Some(3000.0));
        assert!(record.has_position());
    }

    #[test]
    fn test_new_record_is_unenriched() {
        let record = PositionRecord::new("7C6B2D");
        assert!(record.enrichment.is_empty());
        assert!(record.coordinates().is_none());
        assert!((record.age_seconds - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_name_prefers_callsign() {
        let mut record = PositionRecord::new("7C6B2D");
        assert_eq!(record.display_name(), "7C6B2D");

        record.callsign = Some("QFA94".to_string());
        assert_eq!(record.display_name(), "QFA94");
    }
}
