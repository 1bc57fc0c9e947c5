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

//! Feed acquisition layer.
//!
//! Pulls the current aircraft list from a receiver's JSON endpoint or from a
//! file on disk, decodes it into [`PositionRecord`]s and drops stale reports.
//! [`FeedAcquirer::fetch`] never fails: transport and decode problems are
//! logged and produce an empty list.

pub mod aircraft_json;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

use crate::record::PositionRecord;

/// Errors that can occur while acquiring the feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("feed returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected payload shape: {0}")]
    Shape(&'static str),

    #[error("aircraft entry has no hex identity")]
    MissingIdentity,
}

/// Where the feed is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// `http://` or `https://` endpoint.
    Http(String),
    /// Anything else is treated as a local path.
    File(PathBuf),
}

impl FeedSource {
    /// Pick the source kind from the scheme prefix.
    #[must_use]
    pub fn detect(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::Http(source.to_string())
        } else {
            Self::File(PathBuf::from(source))
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Keep only records heard from within `max_age_secs`, preserving order.
#[must_use]
pub fn filter_stale(records: Vec<PositionRecord>, max_age_secs: f64) -> Vec<PositionRecord> {
    records
        .into_iter()
        .filter(|record| record.age_seconds <= max_age_secs)
        .collect()
}

/// Pull-based reader for the aircraft feed.
#[derive(Debug)]
pub struct FeedAcquirer {
    source: FeedSource,
    max_age_secs: f64,
    client: reqwest::Client,
}

impl FeedAcquirer {
    /// Create an acquirer for `source` with the given staleness threshold and
    /// HTTP timeout.
    pub fn new(source: &str, max_age_secs: f64, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            source: FeedSource::detect(source),
            max_age_secs,
            client,
        })
    }

    #[must_use]
    pub fn source(&self) -> &FeedSource {
        &self.source
    }

    #[must_use]
    pub fn max_age_secs(&self) -> f64 {
        self.max_age_secs
    }

    /// Fetch fresh records, degrading to an empty list on any failure.
    pub async fn fetch(&self) -> Vec<PositionRecord> {
        match self.try_fetch().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to fetch aircraft from {}: {e}", self.source);
                Vec::new()
            }
        }
    }

    /// Fetch fresh records, reporting why the feed was unavailable.
    ///
    /// A failed request or decode never yields a partial list.
    pub async fn try_fetch(&self) -> Result<Vec<PositionRecord>, FeedError> {
        let payload = match &self.source {
            FeedSource::Http(url) => self.read_http(url).await?,
            FeedSource::File(path) => read_file(path).await?,
        };

        let records = aircraft_json::parse_payload(&payload)?;
        let parsed = records.len();
        let fresh = filter_stale(records, self.max_age_secs);

        debug!(
            "Read {parsed} aircraft from {} ({} dropped as stale)",
            self.source,
            parsed - fresh.len()
        );

        Ok(fresh)
    }

    async fn read_http(&self, url: &str) -> Result<Vec<u8>, FeedError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    tokio::fs::read(path).await.map_err(|source| FeedError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer a single HTTP request on loopback with `status` and `body`.
    ///
    /// Returns the base URL and a handle resolving to the request head.
    pub(crate) async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;

            String::from_utf8_lossy(&request).into_owned()
        });

        (url, server)
    }

    fn aged(identity: &str, age: f64) -> PositionRecord {
        PositionRecord::new(identity).with_age(age)
    }

    fn acquirer_for(path: &std::path::Path, max_age: f64) -> FeedAcquirer {
        FeedAcquirer::new(path.to_str().unwrap(), max_age, Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_detect_source() {
        assert_eq!(
            FeedSource::detect("http://localhost:8080/data/aircraft.json"),
            FeedSource::Http("http://localhost:8080/data/aircraft.json".to_string())
        );
        assert!(matches!(
            FeedSource::detect("https://example.com/aircraft.json"),
            FeedSource::Http(_)
        ));
        assert_eq!(
            FeedSource::detect("/run/readsb/aircraft.json"),
            FeedSource::File(PathBuf::from("/run/readsb/aircraft.json"))
        );
        // Scheme match is a plain prefix check
        assert!(matches!(FeedSource::detect("ftp://host/file"), FeedSource::File(_)));
    }

    #[test]
    fn test_filter_stale_preserves_order() {
        let records = vec![aged("a", 5.0), aged("b", 15.0), aged("c", 2.0)];
        let fresh = filter_stale(records, 10.0);

        let ids: Vec<_> = fresh.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_filter_stale_boundary_is_inclusive() {
        let fresh = filter_stale(vec![aged("a", 10.0), aged("b", 10.001)], 10.0);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].identity, "a");
    }

    #[tokio::test]
    async fn test_fetch_from_file_applies_staleness() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"aircraft": [
                {{"hex": "aaa111", "seen": 5}},
                {{"hex": "bbb222", "seen": 100}},
                {{"hex": "ccc333", "seen": 1}}
            ]}}"#
        )
        .unwrap();

        let records = acquirer_for(file.path(), 30.0).fetch().await;
        let ids: Vec<_> = records.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, vec!["aaa111", "ccc333"]);
    }

    #[tokio::test]
    async fn test_fetch_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer = acquirer_for(&dir.path().join("missing.json"), 30.0);

        assert!(acquirer.fetch().await.is_empty());
        assert!(matches!(acquirer.try_fetch().await, Err(FeedError::Io { .. })));
    }

    #[tokio::test]
    async fn test_fetch_malformed_file_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"aircraft": [{{"hex": "aaa111""#).unwrap();

        let acquirer = acquirer_for(file.path(), 30.0);
        assert!(acquirer.fetch().await.is_empty());
        assert!(matches!(acquirer.try_fetch().await, Err(FeedError::Decode(_))));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_http_is_empty() {
        // Port 9 (discard) on loopback is expected to refuse connections
        let acquirer = FeedAcquirer::new(
            "http://127.0.0.1:9/data/aircraft.json",
            30.0,
            Duration::from_secs(2),
        )
        .unwrap();

        assert!(acquirer.fetch().await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_http_parses_and_filters() {
        let body = r#"{"now": 1700000000.0, "aircraft": [
            {"hex": "abc", "lat": 51.47, "lon": -0.45, "alt_baro": 3000, "seen": 1},
            {"hex": "old", "seen": 100}
        ]}"#;
        let (url, server) = serve_once("200 OK", body.to_string()).await;
        let acquirer = FeedAcquirer::new(&format!("{url}/data/aircraft.json"), 30.0, Duration::from_secs(5)).unwrap();

        let records = acquirer.fetch().await;
        let ids: Vec<_> = records.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, vec!["abc"]);
        assert_eq!(records[0].altitude, Some(3000.0));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /data/aircraft.json HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_fetch_http_error_status_is_empty() {
        let body = r#"{"aircraft": [{"hex": "abc"}]}"#.to_string();

        let (url, _server) = serve_once("500 Internal Server Error", body.clone()).await;
        let acquirer = FeedAcquirer::new(&url, 30.0, Duration::from_secs(5)).unwrap();
        assert!(acquirer.fetch().await.is_empty());

        let (url, _server) = serve_once("500 Internal Server Error", body).await;
        let acquirer = FeedAcquirer::new(&url, 30.0, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            acquirer.try_fetch().await,
            Err(FeedError::Status(status)) if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR
        ));
    }
}
