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

//! Decoder for the `aircraft.json` payload served by dump1090/readsb style
//! receivers.
//!
//! Field mapping:
//!
//! | source            | record            | default |
//! |-------------------|-------------------|---------|
//! | `hex`             | `identity`        | required |
//! | `flight`/`callsign` | `callsign` (trimmed) | none |
//! | `lat`, `lon`      | `latitude`, `longitude` | none (both or neither) |
//! | `alt_baro`        | `altitude` (ft)   | none |
//! | `gs`              | `ground_speed`    | none |
//! | `track`           | `track_degrees`   | none |
//! | `baro_rate`       | `vertical_rate`   | none |
//! | `seen`            | `age_seconds`     | 0 |

use log::debug;
use serde_json::Value;

use super::FeedError;
use crate::record::PositionRecord;

/// Decode a full feed payload into records, skipping entries without an identity.
pub fn parse_payload(bytes: &[u8]) -> Result<Vec<PositionRecord>, FeedError> {
    let value: Value = serde_json::from_slice(bytes)?;

    let Value::Object(payload) = value else {
        return Err(FeedError::Shape("payload is not a JSON object"));
    };

    let entries = match payload.get("aircraft") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(FeedError::Shape("`aircraft` is not an array")),
    };

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        match parse_aircraft(entry) {
            Ok(record) => records.push(record),
            Err(e) => debug!("Skipping aircraft entry: {e}"),
        }
    }

    Ok(records)
}

/// Map one raw aircraft object onto a [`PositionRecord`].
pub fn parse_aircraft(entry: &Value) -> Result<PositionRecord, FeedError> {
    let identity = entry
        .get("hex")
        .and_then(Value::as_str)
        .filter(|hex| !hex.trim().is_empty())
        .ok_or(FeedError::MissingIdentity)?;

    let mut record = PositionRecord::new(identity);

    // `flight` wins whenever the key is present, even if blank
    record.callsign = entry
        .get("flight")
        .or_else(|| entry.get("callsign"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|callsign| !callsign.is_empty())
        .map(str::to_owned);

    if let (Some(lat), Some(lon)) = (number(entry, "lat"), number(entry, "lon")) {
        record.latitude = Some(lat);
        record.longitude = Some(lon);
    }

    // readsb reports "ground" here for surface traffic
    record.altitude = number(entry, "alt_baro");
    record.ground_speed = number(entry, "gs");
    record.track_degrees = number(entry, "track");
    record.vertical_rate = number(entry, "baro_rate");
    record.age_seconds = number(entry, "seen").unwrap_or(0.0);

    Ok(record)
}

fn number(entry: &Value, key: &str) -> Option<f64> {
    entry
        .get(key)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
}
