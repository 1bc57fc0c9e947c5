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

//! Overhead zone classification.
//!
//! An aircraft is overhead when it is within `radius_km` of the reference
//! point (great-circle distance) and its barometric altitude lies inside the
//! configured band. Ranked output is closest first.

use serde::Serialize;

use crate::record::PositionRecord;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const METERS_PER_FOOT: f64 = 0.3048;

/// Great-circle distance in kilometers using the Haversine formula.
#[must_use]
pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // asin form keeps the distance at exactly zero for identical points
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Initial bearing from point 1 to point 2 in degrees, normalized to [0, 360).
#[must_use]
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let x = delta_lon.sin() * lat2_rad.cos();
    let y = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lon.cos();

    let bearing = x.atan2(y).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Convert feet to meters.
#[must_use]
pub fn feet_to_meters(feet: f64) -> f64 {
    feet * METERS_PER_FOOT
}

/// Reference point and altitude band that define "overhead".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverheadZone {
    /// Reference latitude in degrees.
    pub latitude: f64,
    /// Reference longitude in degrees.
    pub longitude: f64,
    /// Maximum great-circle distance from the reference point.
    pub radius_km: f64,
    /// Lowest altitude (meters) still counted as overhead.
    pub min_altitude_m: f64,
    /// Highest altitude (meters) counted as overhead, `None` for no ceiling.
    pub max_altitude_m: Option<f64>,
}

impl OverheadZone {
    /// Zone centered on the given point with the default radius and band.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Self::default()
        }
    }
}

impl Default for OverheadZone {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            radius_km: 3.0,
            min_altitude_m: 500.0,
            max_altitude_m: Some(12_000.0),
        }
    }
}

/// An overhead record paired with its position relative to the reference point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverheadAircraft {
    #[serde(flatten)]
    pub record: PositionRecord,
    pub distance_km: f64,
    pub bearing_degrees: f64,
}

/// Classifies and ranks records against an [`OverheadZone`].
#[derive(Debug, Clone)]
pub struct Geofence {
    zone: OverheadZone,
}

impl Geofence {
    #[must_use]
    pub fn new(zone: OverheadZone) -> Self {
        Self { zone }
    }

    #[must_use]
    pub fn zone(&self) -> &OverheadZone {
        &self.zone
    }

    /// Distance in kilometers from the reference point.
    #[must_use]
    pub fn distance_km(&self, lat: f64, lon: f64) -> f64 {
        haversine_distance_km(self.zone.latitude, self.zone.longitude, lat, lon)
    }

    /// Bearing in degrees from the reference point.
    #[must_use]
    pub fn bearing_degrees(&self, lat: f64, lon: f64) -> f64 {
        initial_bearing(self.zone.latitude, self.zone.longitude, lat, lon)
    }

    /// Whether the record is inside the radius and altitude band.
    #[must_use]
    pub fn is_overhead(&self, record: &PositionRecord) -> bool {
        self.classify(record).is_some()
    }

    /// Overhead records sorted by distance, closest first.
    ///
    /// The sort is stable, so equidistant aircraft keep their feed order.
    #[must_use]
    pub fn rank_overhead(&self, records: Vec<PositionRecord>) -> Vec<OverheadAircraft> {
        let mut overhead: Vec<OverheadAircraft> = records
            .into_iter()
            .filter_map(|record| {
                let distance_km = self.classify(&record)?;
                let (lat, lon) = record.coordinates()?;
                Some(OverheadAircraft {
                    bearing_degrees: self.bearing_degrees(lat, lon),
                    distance_km,
                    record,
                })
            })
            .collect();

        overhead.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        overhead
    }

    /// Distance to an overhead record, `None` when it is outside the zone.
    fn classify(&self, record: &PositionRecord) -> Option<f64> {
        if !record.has_position() {
            return None;
        }
        let (lat, lon) = record.coordinates()?;
        let altitude_m = feet_to_meters(record.altitude?);

        let distance = self.distance_km(lat, lon);
        if distance > self.zone.radius_km {
            return None;
        }
        if altitude_m < self.zone.min_altitude_m {
            return None;
        }
        if self.zone.max_altitude_m.is_some_and(|max| altitude_m > max) {
            return None;
        }

        Some(distance)
    }
}
