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

//! Published tick output and counters.
//!
//! A [`TrackerSnapshot`] is built once per tick and replaced as a whole, so
//! readers always see one consistent tick.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::enrichment::CacheStats;
use crate::geofence::OverheadAircraft;

/// Whether anything is currently overhead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneState {
    #[default]
    Empty,
    Occupied,
}

impl ZoneState {
    #[must_use]
    pub fn from_count(count: usize) -> Self {
        if count == 0 {
            Self::Empty
        } else {
            Self::Occupied
        }
    }
}

/// Running counters for observability consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    /// Sum of fresh aircraft counts over every tick.
    pub total_aircraft_seen: u64,
    /// Aircraft overhead after the last tick.
    pub overhead_count: usize,
    /// Outbound enrichment requests issued.
    pub api_calls: u64,
    /// Feed failures plus failed enrichment lookups.
    pub errors: u64,
    /// Completed ticks.
    pub ticks: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
}

impl TrackerStats {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            total_aircraft_seen: 0,
            overhead_count: 0,
            api_calls: 0,
            errors: 0,
            ticks: 0,
            last_update: None,
            started_at,
        }
    }

    /// Seconds since the tracker started, as of `now`.
    #[must_use]
    pub fn uptime_seconds(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.started_at).num_seconds()).unwrap_or(0)
    }
}

/// An aircraft that newly entered the zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentArrival {
    pub identity: String,
    /// Callsign if known, otherwise the identity.
    pub callsign: String,
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// Altitude in feet at arrival.
    pub altitude: Option<f64>,
    pub arrived_at: DateTime<Utc>,
}

/// Bounded, oldest-first list of recent arrivals.
#[derive(Debug, Clone)]
pub struct RecentArrivals {
    entries: VecDeque<RecentArrival>,
    capacity: usize,
}

impl RecentArrivals {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `arrival` unless its identity is already listed.
    ///
    /// Returns whether the entry was added.
    pub fn push(&mut self, arrival: RecentArrival) -> bool {
        if self.capacity == 0 || self.contains(&arrival.identity) {
            return false;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(arrival);
        true
    }

    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.entries.iter().any(|entry| entry.identity == identity)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<RecentArrival> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output of the last completed tick.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerSnapshot {
    /// Overhead aircraft, closest first.
    pub overhead: Vec<OverheadAircraft>,
    /// Fresh aircraft in the feed, overhead or not.
    pub total_count: usize,
    pub zone: ZoneState,
    pub stats: TrackerStats,
    pub cache: CacheStats,
    /// Oldest first.
    pub recent_arrivals: Vec<RecentArrival>,
}

impl TrackerSnapshot {
    /// Snapshot published before the first tick completes.
    #[must_use]
    pub fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            overhead: Vec::new(),
            total_count: 0,
            zone: ZoneState::Empty,
            stats: TrackerStats::new(started_at),
            cache: CacheStats::default(),
            recent_arrivals: Vec::new(),
        }
    }

    #[must_use]
    pub fn overhead_count(&self) -> usize {
        self.overhead.len()
    }

    /// The closest overhead aircraft, if any.
    #[must_use]
    pub fn closest(&self) -> Option<&OverheadAircraft> {
        self.overhead.first()
    }
}
