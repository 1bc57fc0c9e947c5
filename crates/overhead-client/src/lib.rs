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

//! Overhead aircraft tracking library.
//!
//! Turns a periodically refreshed `aircraft.json` position feed into a ranked,
//! enriched list of the aircraft currently above a reference point. The
//! pipeline is split into layers that can be used on their own:
//!
//! - **Feed layer**: HTTP or file acquisition, lenient payload parsing and
//!   staleness filtering
//! - **Geofence layer**: great-circle distance, bearing and the overhead test
//! - **Enrichment layer**: TTL cache and rate limiter in front of a pluggable
//!   route provider
//! - **Tracker layer**: the fixed-interval loop that ties everything together
//!
//! # Quick Start
//!
//! ```no_run
//! use overhead_client::{OverheadZone, Tracker, TrackerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tracker = Tracker::spawn(TrackerConfig {
//!         data_source: "http://localhost:8080/data/aircraft.json".to_string(),
//!         zone: OverheadZone::new(-37.7964, 144.9008),
//!         ..Default::default()
//!     })
//!     .expect("valid configuration");
//!
//!     let mut events = tracker.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!         for aircraft in tracker.overhead() {
//!             println!("{} at {:.1} km", aircraft.record.display_name(), aircraft.distance_km);
//!         }
//!     }
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! ```
//! use overhead_client::feed::aircraft_json::parse_payload;
//! use overhead_client::{Geofence, OverheadZone};
//!
//! let payload = br#"{"aircraft": [{"hex": "7c6b2d", "lat": -37.80, "lon": 144.90, "alt_baro": 4000}]}"#;
//! let records = parse_payload(payload).unwrap();
//!
//! let geofence = Geofence::new(OverheadZone::new(-37.7964, 144.9008));
//! let overhead = geofence.rank_overhead(records);
//! assert_eq!(overhead.len(), 1);
//! ```

pub mod enrichment;
pub mod feed;
pub mod geofence;
pub mod record;
pub mod status;
pub mod tracker;

use std::sync::Arc;

use log::debug;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use enrichment::{
    CacheStats, EnrichmentCache, EnrichmentConfig, LookupError, OpenSkyProvider, ProviderKind,
    RateLimiter, RouteProvider,
};
pub use feed::{FeedAcquirer, FeedError, FeedSource};
pub use geofence::{Geofence, OverheadAircraft, OverheadZone};
pub use record::{Enrichment, PositionRecord};
pub use status::{RecentArrival, TrackerSnapshot, TrackerStats, ZoneState};
pub use tracker::{TrackerConfig, TrackerError, TrackerEvent, TrackingLoop};

/// Handle to a tracking loop running as a background task.
///
/// Dropping the handle cancels the loop at its next tick boundary.
pub struct Tracker {
    snapshot_rx: watch::Receiver<Arc<TrackerSnapshot>>,
    event_tx: broadcast::Sender<TrackerEvent>,
    refresh: Arc<Notify>,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Tracker {
    /// Build the pipeline from `config` and start ticking.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: TrackerConfig) -> Result<Self, TrackerError> {
        Ok(Self::spawn_loop(TrackingLoop::new(config)?))
    }

    /// Start an already constructed loop.
    #[must_use]
    pub fn spawn_loop(tracking: TrackingLoop) -> Self {
        let snapshot_rx = tracking.snapshots();
        let event_tx = tracking.event_sender();
        let refresh = Arc::new(Notify::new());
        let cancel_token = CancellationToken::new();

        let task = tokio::spawn(tracking.run(cancel_token.clone(), Arc::clone(&refresh)));

        Self {
            snapshot_rx,
            event_tx,
            refresh,
            cancel_token,
            task: Some(task),
        }
    }

    /// The output of the last completed tick.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TrackerSnapshot> {
        Arc::clone(&self.snapshot_rx.borrow())
    }

    /// Overhead aircraft from the last completed tick, closest first.
    #[must_use]
    pub fn overhead(&self) -> Vec<OverheadAircraft> {
        self.snapshot().overhead.clone()
    }

    /// Receiver for awaiting new snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Arc<TrackerSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Subscribe to tracker events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_tx.subscribe()
    }

    /// Wake the loop for an immediate tick instead of waiting out the interval.
    pub fn request_update(&self) {
        debug!("Requesting immediate update");
        self.refresh.notify_one();
    }

    /// Stop the loop after the tick in progress, if any.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Shut down and wait for the loop task to finish.
    pub async fn join(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
