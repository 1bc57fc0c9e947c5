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

//! Periodic status lines and event logging for the running tracker.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use overhead_client::{TrackerEvent, TrackerSnapshot};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

/// Format seconds as `Hh Mm Ss`.
#[must_use]
pub fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours}h {minutes}m {secs}s")
}

/// One-line summary of a snapshot.
#[must_use]
pub fn summary_line(snapshot: &TrackerSnapshot, now: DateTime<Utc>) -> String {
    let stats = &snapshot.stats;
    let mut line = format!(
        "Uptime {} | {} aircraft, {} overhead | {} seen total | {} API calls, {} errors",
        format_uptime(stats.uptime_seconds(now)),
        snapshot.total_count,
        snapshot.overhead_count(),
        stats.total_aircraft_seen,
        stats.api_calls,
        stats.errors
    );

    if let Some(closest) = snapshot.closest() {
        let record = &closest.record;
        let _ = write!(
            line,
            " | closest: {} {:.1} km",
            record.display_name(),
            closest.distance_km
        );
        if let Some(altitude) = record.altitude {
            let _ = write!(line, " at {altitude:.0} ft");
        }
        if let Some(origin) = &record.enrichment.origin_country {
            let _ = write!(line, " from {origin}");
        }
    }

    line
}

/// Human readable form of a tracker event.
#[must_use]
pub fn describe_event(event: &TrackerEvent) -> String {
    match event {
        TrackerEvent::ZoneOccupied { count } => format!("Zone occupied ({count} overhead)"),
        TrackerEvent::ZoneCleared => "Zone clear".to_string(),
        TrackerEvent::AircraftArrived {
            identity,
            callsign,
            distance_km,
        } => format!(
            "Arrived: {} ({identity}) at {distance_km:.1} km",
            callsign.as_deref().unwrap_or(identity)
        ),
        TrackerEvent::AircraftDeparted { identity } => format!("Departed: {identity}"),
    }
}

/// Log a summary of the latest snapshot every `interval` until cancelled.
pub async fn report_status(
    snapshots: watch::Receiver<Arc<TrackerSnapshot>>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick fires immediately, before anything has been fetched
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = Arc::clone(&snapshots.borrow());
                info!("{}", summary_line(&snapshot, Utc::now()));
            }
            () = cancel_token.cancelled() => break,
        }
    }
}

/// Log every tracker event until cancelled or the tracker goes away.
pub async fn log_events(mut events: broadcast::Receiver<TrackerEvent>, cancel_token: CancellationToken) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event @ TrackerEvent::AircraftDeparted { .. }) => debug!("{}", describe_event(&event)),
                Ok(event) => info!("{}", describe_event(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event logger fell behind, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            () = cancel_token.cancelled() => break,
        }
    }
}
