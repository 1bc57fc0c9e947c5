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

//! `OpenSky` Network state-vector lookup.
//!
//! Queries `/states/all?icao24=<hex>` and reads the origin country (index 2)
//! and callsign (index 1) from the first state vector returned.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{LookupError, RouteProvider};
use crate::record::Enrichment;

/// Public `OpenSky` REST endpoint.
pub const OPENSKY_API_URL: &str = "https://opensky-network.org/api";

#[derive(Debug, Deserialize)]
struct StatesResponse {
    #[serde(default)]
    states: Option<Vec<Vec<Value>>>,
}

/// State-vector provider backed by the `OpenSky` Network API.
#[derive(Debug)]
pub struct OpenSkyProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenSkyProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn states_url(&self, identity: &str) -> String {
        format!(
            "{}/states/all?icao24={}",
            self.base_url,
            identity.to_lowercase()
        )
    }
}

#[async_trait]
impl RouteProvider for OpenSkyProvider {
    fn name(&self) -> &'static str {
        "opensky"
    }

    async fn lookup(&self, identity: &str) -> Result<Option<Enrichment>, LookupError> {
        let response = self.client.get(self.states_url(identity)).send().await?;

        if !response.status().is_success() {
            return Err(LookupError::Status(response.status()));
        }

        let body = response.bytes().await?;
        parse_states(&body)
    }
}

/// Extract enrichment fields from a `/states/all` response body.
///
/// Returns `Ok(None)` when the aircraft has no state vector.
pub fn parse_states(body: &[u8]) -> Result<Option<Enrichment>, LookupError> {
    let response: StatesResponse = serde_json::from_slice(body)?;

    let Some(state) = response.states.and_then(|states| states.into_iter().next()) else {
        return Ok(None);
    };

    let flight_number = state
        .get(1)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|callsign| !callsign.is_empty())
        .map(str::to_owned);

    let origin_country = state.get(2).and_then(Value::as_str).map(str::to_owned);

    Ok(Some(Enrichment {
        flight_number,
        origin_country,
        ..Enrichment::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::tests::serve_once;

    #[test]
    fn test_parse_state_vector() {
        let body = br#"{"time": 1700000000, "states": [[
            "abc123", "BAW123  ", "United Kingdom", 1700000000, 1700000000,
            -0.1, 51.5, 10000.0, false, 230.0, 90.0, 0.0, null, 10200.0, "1234", false, 0
        ]]}"#;

        let fields = parse_states(body).unwrap().unwrap();
        assert_eq!(fields.origin_country.as_deref(), Some("United Kingdom"));
        assert_eq!(fields.flight_number.as_deref(), Some("BAW123"));
        assert!(fields.destination_country.is_none());
        assert!(fields.origin_airport.is_none());
    }

    #[test]
    fn test_parse_no_states() {
        assert!(parse_states(br#"{"time": 1, "states": null}"#).unwrap().is_none());
        assert!(parse_states(br#"{"time": 1, "states": []}"#).unwrap().is_none());
        assert!(parse_states(br#"{"time": 1}"#).unwrap().is_none());
    }

    #[test]
    fn test_parse_short_state_vector() {
        let fields = parse_states(br#"{"states": [["abc123"]]}"#).unwrap().unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn test_parse_malformed_body() {
        assert!(matches!(parse_states(b"<html>"), Err(LookupError::Decode(_))));
        assert!(matches!(
            parse_states(br#"{"states": "nope"}"#),
            Err(LookupError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_success() {
        let body = r#"{"time": 1700000000, "states": [["abc123", "BAW1    ", "United Kingdom"]]}"#;
        let (url, server) = serve_once("200 OK", body.to_string()).await;
        let provider = OpenSkyProvider::new(&url, Duration::from_secs(5)).unwrap();

        let fields = provider.lookup("ABC123").await.unwrap().unwrap();
        assert_eq!(fields.flight_number.as_deref(), Some("BAW1"));
        assert_eq!(fields.origin_country.as_deref(), Some("United Kingdom"));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /states/all?icao24=abc123 HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_lookup_rate_limited_is_status_error() {
        let (url, _server) = serve_once("429 Too Many Requests", "{}".to_string()).await;
        let provider = OpenSkyProvider::new(&url, Duration::from_secs(5)).unwrap();

        assert!(matches!(
            provider.lookup("abc123").await,
            Err(LookupError::Status(status)) if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        ));
    }

    #[test]
    fn test_states_url_lowercases_identity() {
        let provider = OpenSkyProvider::new("https://opensky-network.org/api/", Duration::from_secs(10)).unwrap();
        assert_eq!(
            provider.states_url("ABC123"),
            "https://opensky-network.org/api/states/all?icao24=abc123"
        );
    }
}
