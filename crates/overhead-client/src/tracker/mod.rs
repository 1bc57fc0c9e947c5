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

//! Fixed-interval tracking loop.
//!
//! Each tick acquires the feed, ranks overhead aircraft, enriches the ones
//! that just arrived, emits change events and publishes a fresh
//! [`TrackerSnapshot`]. Ticks never overlap and cancellation is only observed
//! between ticks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Notify};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::enrichment::{EnrichmentCache, EnrichmentConfig, LookupError};
use crate::feed::{FeedAcquirer, FeedError};
use crate::geofence::{Geofence, OverheadZone};
use crate::record::Enrichment;
use crate::status::{RecentArrival, RecentArrivals, TrackerSnapshot, TrackerStats, ZoneState};

/// Errors that can occur while setting up the tracking loop.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to set up feed: {0}")]
    Feed(#[from] FeedError),

    #[error("failed to set up enrichment: {0}")]
    Enrichment(#[from] LookupError),
}

/// Events emitted when the overhead set changes.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// The zone went from empty to occupied.
    ZoneOccupied { count: usize },
    /// The zone went from occupied to empty.
    ZoneCleared,
    /// An aircraft entered the zone (after enrichment).
    AircraftArrived {
        identity: String,
        callsign: Option<String>,
        distance_km: f64,
    },
    /// An aircraft that was overhead last tick no longer is.
    AircraftDeparted { identity: String },
}

/// Configuration for the tracking loop.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// `http(s)://` URL or local path of the `aircraft.json` feed.
    pub data_source: String,
    /// Reports older than this many seconds are dropped.
    pub max_age_secs: f64,
    /// HTTP timeout for feed requests.
    pub feed_timeout: Duration,
    pub zone: OverheadZone,
    /// Sleep between ticks.
    pub update_interval: Duration,
    pub enrichment: EnrichmentConfig,
    /// How many recent arrivals the snapshot keeps.
    pub recent_capacity: usize,
    /// Broadcast channel capacity for events.
    pub event_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_source: "http://localhost:8080/data/aircraft.json".to_string(),
            max_age_secs: 30.0,
            feed_timeout: Duration::from_secs(10),
            zone: OverheadZone::default(),
            update_interval: Duration::from_secs(2),
            enrichment: EnrichmentConfig::default(),
            recent_capacity: 20,
            event_channel_capacity: 256,
        }
    }
}

/// The acquisition → geofence → enrichment pipeline plus cross-tick state.
#[derive(Debug)]
pub struct TrackingLoop {
    acquirer: FeedAcquirer,
    geofence: Geofence,
    cache: EnrichmentCache,
    update_interval: Duration,
    /// Identities overhead after the last tick, with the enrichment they carried.
    previous: HashMap<String, Enrichment>,
    recent: RecentArrivals,
    stats: TrackerStats,
    feed_errors: u64,
    snapshot_tx: watch::Sender<Arc<TrackerSnapshot>>,
    event_tx: broadcast::Sender<TrackerEvent>,
}

impl TrackingLoop {
    /// Build the loop, selecting the enrichment provider from `config`.
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerError> {
        let cache = EnrichmentCache::from_config(&config.enrichment)?;
        Self::with_cache(config, cache)
    }

    /// Build the loop around an existing enrichment cache.
    pub fn with_cache(config: TrackerConfig, cache: EnrichmentCache) -> Result<Self, TrackerError> {
        let acquirer = FeedAcquirer::new(&config.data_source, config.max_age_secs, config.feed_timeout)?;
        let started_at = Utc::now();
        let (snapshot_tx, _) = watch::channel(Arc::new(TrackerSnapshot::empty(started_at)));
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Ok(Self {
            acquirer,
            geofence: Geofence::new(config.zone),
            cache,
            update_interval: config.update_interval,
            previous: HashMap::new(),
            recent: RecentArrivals::new(config.recent_capacity),
            stats: TrackerStats::new(started_at),
            feed_errors: 0,
            snapshot_tx,
            event_tx,
        })
    }

    #[must_use]
    pub fn geofence(&self) -> &Geofence {
        &self.geofence
    }

    #[must_use]
    pub fn cache(&self) -> &EnrichmentCache {
        &self.cache
    }

    /// Subscribe to tracker events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_tx.subscribe()
    }

    /// Receiver that always holds the latest published snapshot.
    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<Arc<TrackerSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<TrackerEvent> {
        self.event_tx.clone()
    }

    /// Run one full pass of the pipeline and publish its snapshot.
    pub async fn tick(&mut self) -> Arc<TrackerSnapshot> {
        let records = match self.acquirer.try_fetch().await {
            Ok(records) => records,
            Err(e) => {
                self.feed_errors += 1;
                warn!("Failed to fetch aircraft from {}: {e}", self.acquirer.source());
                Vec::new()
            }
        };
        let total_count = records.len();

        let mut overhead = self.geofence.rank_overhead(records);
        // Keep only the closest report per identity
        let mut seen = HashSet::with_capacity(overhead.len());
        overhead.retain(|aircraft| seen.insert(aircraft.record.identity.clone()));

        debug!("Tick: {total_count} aircraft, {} overhead", overhead.len());

        for aircraft in &mut overhead {
            if let Some(enrichment) = self.previous.get(&aircraft.record.identity) {
                aircraft.record.enrichment = enrichment.clone();
                continue;
            }

            self.cache.enrich(&mut aircraft.record).await;

            let record = &aircraft.record;
            info!(
                "New overhead aircraft: {} ({:.1} km, bearing {:.0}°)",
                record.display_name(),
                aircraft.distance_km,
                aircraft.bearing_degrees
            );
            self.recent.push(RecentArrival {
                identity: record.identity.clone(),
                callsign: record.display_name().to_string(),
                origin: record.enrichment.origin_country.clone(),
                destination: record.enrichment.destination_country.clone(),
                altitude: record.altitude,
                arrived_at: Utc::now(),
            });
            let _ = self.event_tx.send(TrackerEvent::AircraftArrived {
                identity: record.identity.clone(),
                callsign: record.callsign.clone(),
                distance_km: aircraft.distance_km,
            });
        }

        let current: HashMap<String, Enrichment> = overhead
            .iter()
            .map(|aircraft| (aircraft.record.identity.clone(), aircraft.record.enrichment.clone()))
            .collect();

        for identity in self.previous.keys().filter(|id| !current.contains_key(*id)) {
            debug!("Aircraft left the zone: {identity}");
            let _ = self.event_tx.send(TrackerEvent::AircraftDeparted {
                identity: identity.clone(),
            });
        }

        let was = ZoneState::from_count(self.previous.len());
        let zone = ZoneState::from_count(overhead.len());
        match (was, zone) {
            (ZoneState::Empty, ZoneState::Occupied) => {
                info!("Zone occupied: {} aircraft overhead", overhead.len());
                let _ = self.event_tx.send(TrackerEvent::ZoneOccupied {
                    count: overhead.len(),
                });
            }
            (ZoneState::Occupied, ZoneState::Empty) => {
                info!("No aircraft overhead");
                let _ = self.event_tx.send(TrackerEvent::ZoneCleared);
            }
            _ => {}
        }

        self.previous = current;

        let pruned = self.cache.prune_expired();
        if pruned > 0 {
            debug!("Pruned {pruned} expired enrichment entries");
        }

        let cache = self.cache.stats();
        self.stats.total_aircraft_seen += u64::try_from(total_count).unwrap_or(u64::MAX);
        self.stats.overhead_count = overhead.len();
        self.stats.api_calls = cache.lookups;
        self.stats.errors = self.feed_errors + cache.failures;
        self.stats.ticks += 1;
        self.stats.last_update = Some(Utc::now());

        let snapshot = Arc::new(TrackerSnapshot {
            overhead,
            total_count,
            zone,
            stats: self.stats.clone(),
            cache,
            recent_arrivals: self.recent.to_vec(),
        });
        self.snapshot_tx.send_replace(Arc::clone(&snapshot));

        snapshot
    }

    /// Tick until `cancel_token` fires, sleeping `update_interval` between ticks.
    ///
    /// A notification on `refresh` cuts the current sleep short.
    pub async fn run(mut self, cancel_token: CancellationToken, refresh: Arc<Notify>) {
        info!(
            "Tracking aircraft from {} every {:.1}s",
            self.acquirer.source(),
            self.update_interval.as_secs_f64()
        );

        while !cancel_token.is_cancelled() {
            self.tick().await;

            tokio::select! {
                () = sleep(self.update_interval) => {}
                () = refresh.notified() => {
                    debug!("Manual update requested");
                }
                () = cancel_token.cancelled() => {}
            }
        }

        info!("Tracking loop stopped");
    }
}
