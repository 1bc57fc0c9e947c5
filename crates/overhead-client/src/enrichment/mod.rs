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

//! Route/origin enrichment with TTL caching and outbound rate limiting.
//!
//! The [`EnrichmentCache`] answers from memory while an entry is fresh and
//! only then falls back to the configured [`RouteProvider`]. Every provider
//! request goes through a [`RateLimiter`], so one busy tick cannot flood the
//! upstream API. Lookup failures are logged and leave the record unenriched.

pub mod opensky;
pub mod rate_limit;

pub use opensky::{OpenSkyProvider, OPENSKY_API_URL};
pub use rate_limit::RateLimiter;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::record::{Enrichment, PositionRecord};

/// Errors that can occur during a provider lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unsupported enrichment provider '{0}'")]
    Unsupported(String),
}

/// A source of route/origin data keyed by aircraft identity.
///
/// Implement this trait to add a new provider; the cache does not change.
#[async_trait]
pub trait RouteProvider: Send + Sync + fmt::Debug {
    /// Short provider name used in logs and stats.
    fn name(&self) -> &str;

    /// Look up enrichment fields for `identity`.
    ///
    /// Returns `Ok(None)` when the provider has nothing for this aircraft.
    async fn lookup(&self, identity: &str) -> Result<Option<Enrichment>, LookupError>;
}

/// Provider selection by configured name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// `OpenSky` Network state vectors.
    OpenSky,
    /// ADS-B Exchange, recognized but not implemented.
    AdsbExchange,
    /// Enrichment turned off.
    Disabled,
    /// Any other name.
    Unknown(String),
}

impl ProviderKind {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "opensky" => Self::OpenSky,
            "adsbexchange" => Self::AdsbExchange,
            "" | "none" | "disabled" => Self::Disabled,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Enrichment settings.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Provider name, see [`ProviderKind::from_name`].
    pub provider: String,
    /// Base URL of the provider API.
    pub base_url: String,
    /// How long a cached lookup stays valid.
    pub cache_ttl: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Minimum gap between outbound requests.
    pub min_request_spacing: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            provider: "opensky".to_string(),
            base_url: OPENSKY_API_URL.to_string(),
            cache_ttl: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
            min_request_spacing: Duration::from_secs(1),
        }
    }
}

/// Build the provider named in `config`, or `None` when enrichment is off.
///
/// Unknown and unimplemented providers are logged and treated as disabled.
pub fn build_provider(config: &EnrichmentConfig) -> Result<Option<Box<dyn RouteProvider>>, LookupError> {
    match ProviderKind::from_name(&config.provider) {
        ProviderKind::OpenSky => {
            let provider = OpenSkyProvider::new(&config.base_url, config.request_timeout)?;
            Ok(Some(Box::new(provider)))
        }
        ProviderKind::Disabled => {
            info!("Enrichment disabled");
            Ok(None)
        }
        ProviderKind::AdsbExchange => {
            warn!("ADS-B Exchange enrichment is not implemented yet; enrichment disabled");
            Ok(None)
        }
        ProviderKind::Unknown(name) => {
            warn!("{}; enrichment disabled", LookupError::Unsupported(name));
            Ok(None)
        }
    }
}

/// Cache and rate-limit state for external inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Active provider name, `None` when enrichment is disabled.
    pub provider: Option<String>,
    /// Entries currently held (fresh or not yet pruned).
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Outbound provider requests issued.
    pub lookups: u64,
    /// Outbound requests that failed.
    pub failures: u64,
    /// Wall-clock time of the last outbound request.
    pub last_lookup_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct CacheEntry {
    fields: Enrichment,
    cached_at: Instant,
}

/// TTL cache in front of a rate-limited [`RouteProvider`].
#[derive(Debug)]
pub struct EnrichmentCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    provider: Option<Box<dyn RouteProvider>>,
    rate_limiter: RateLimiter,
    stats: CacheStats,
}

impl EnrichmentCache {
    /// Create a cache around `provider` (`None` disables lookups).
    #[must_use]
    pub fn new(provider: Option<Box<dyn RouteProvider>>, ttl: Duration, min_request_spacing: Duration) -> Self {
        let stats = CacheStats {
            provider: provider.as_ref().map(|p| p.name().to_string()),
            ..CacheStats::default()
        };

        Self {
            entries: HashMap::new(),
            ttl,
            provider,
            rate_limiter: RateLimiter::new(min_request_spacing),
            stats,
        }
    }

    /// Create a cache with the provider selected by `config`.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, LookupError> {
        Ok(Self::new(
            build_provider(config)?,
            config.cache_ttl,
            config.min_request_spacing,
        ))
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// True if an entry exists for `identity` and is younger than the TTL.
    #[must_use]
    pub fn is_fresh(&self, identity: &str) -> bool {
        self.entries
            .get(identity)
            .is_some_and(|entry| entry.cached_at.elapsed() < self.ttl)
    }

    /// Cached fields for `identity`, only while fresh.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&Enrichment> {
        self.entries
            .get(identity)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| &entry.fields)
    }

    /// Store fields for `identity`, stamped with the current time.
    pub fn insert(&mut self, identity: impl Into<String>, fields: Enrichment) {
        self.entries.insert(
            identity.into(),
            CacheEntry {
                fields,
                cached_at: Instant::now(),
            },
        );
    }

    /// Fill `record.enrichment` from the cache or, on a miss, from the provider.
    ///
    /// A fresh cache entry never triggers an outbound request. Lookup errors
    /// are logged and leave the enrichment unset.
    pub async fn enrich(&mut self, record: &mut PositionRecord) {
        if let Some(fields) = self.get(&record.identity).cloned() {
            self.stats.hits += 1;
            record.enrichment = fields;
            return;
        }
        self.stats.misses += 1;

        let Some(provider) = self.provider.as_ref() else {
            return;
        };

        self.rate_limiter.acquire().await;
        self.stats.lookups += 1;
        self.stats.last_lookup_at = Some(Utc::now());

        match provider.lookup(&record.identity).await {
            Ok(Some(fields)) => {
                debug!("Enriched {} via {}", record.display_name(), provider.name());
                self.entries.insert(
                    record.identity.clone(),
                    CacheEntry {
                        fields: fields.clone(),
                        cached_at: Instant::now(),
                    },
                );
                record.enrichment = fields;
            }
            Ok(None) => {
                debug!("No {} data for {}", provider.name(), record.display_name());
            }
            Err(e) => {
                self.stats.failures += 1;
                warn!(
                    "Enrichment lookup for {} via {} failed: {e}",
                    record.display_name(),
                    provider.name()
                );
            }
        }
    }

    /// Enrich each record in order, one at a time.
    pub async fn enrich_all(&mut self, records: &mut [PositionRecord]) {
        for record in records {
            self.enrich(record).await;
        }
    }

    /// Drop expired entries, returning how many were removed.
    pub fn prune_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);
        before - self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// What the fake provider answers with.
    #[derive(Debug, Clone, Copy)]
    pub(crate) enum Reply {
        Found,
        Nothing,
        Fail,
    }

    /// Provider that records every call instead of touching the network.
    #[derive(Debug, Clone)]
    pub(crate) struct FakeProvider {
        pub(crate) calls: Arc<Mutex<Vec<(String, Instant)>>>,
        reply: Reply,
    }

    impl FakeProvider {
        pub(crate) fn new(reply: Reply) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                reply,
            }
        }

        pub(crate) fn call_ids(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
        }
    }

    #[async_trait]
    impl RouteProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn lookup(&self, identity: &str) -> Result<Option<Enrichment>, LookupError> {
            self.calls
                .lock()
                .unwrap()
                .push((identity.to_string(), Instant::now()));

            match self.reply {
                Reply::Found => Ok(Some(australia(identity))),
                Reply::Nothing => Ok(None),
                Reply::Fail => Err(LookupError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE)),
            }
        }
    }

    pub(crate) fn australia(identity: &str) -> Enrichment {
        Enrichment {
            flight_number: Some(format!("QFA{}", identity.len())),
            origin_country: Some("Australia".to_string()),
            ..Enrichment::default()
        }
    }

    fn cache_with(provider: &FakeProvider, ttl_secs: u64) -> EnrichmentCache {
        EnrichmentCache::new(
            Some(Box::new(provider.clone())),
            Duration::from_secs(ttl_secs),
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_provider() {
        let provider = FakeProvider::new(Reply::Fail);
        let mut cache = cache_with(&provider, 300);

        let cached = Enrichment {
            origin_country: Some("New Zealand".to_string()),
            destination_airport: Some("YMML".to_string()),
            ..Enrichment::default()
        };
        cache.insert("c40a3d", cached.clone());

        let mut record = PositionRecord::new("c40a3d");
        cache.enrich(&mut record).await;

        assert!(provider.call_ids().is_empty());
        assert_eq!(record.enrichment, cached);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().lookups, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let provider = FakeProvider::new(Reply::Found);
        let mut cache = cache_with(&provider, 1);

        cache.insert("c39b82", australia("c39b82"));
        assert!(cache.is_fresh("c39b82"));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!cache.is_fresh("c39b82"));
        assert!(cache.get("c39b82").is_none());
        assert!(!cache.is_fresh("unknown"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_fetches_and_caches() {
        let provider = FakeProvider::new(Reply::Found);
        let mut cache = cache_with(&provider, 300);

        let mut first = PositionRecord::new("c3ba12");
        cache.enrich(&mut first).await;
        assert_eq!(first.enrichment, australia("c3ba12"));
        assert!(cache.is_fresh("c3ba12"));

        let mut again = PositionRecord::new("c3ba12");
        cache.enrich(&mut again).await;
        assert_eq!(again.enrichment, australia("c3ba12"));

        assert_eq!(provider.call_ids(), vec!["c3ba12"]);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.lookups), (1, 1, 1));
        assert_eq!(stats.provider.as_deref(), Some("fake"));
        assert!(stats.last_lookup_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let provider = FakeProvider::new(Reply::Found);
        let mut cache = cache_with(&provider, 5);

        cache.enrich(&mut PositionRecord::new("c3d5f8")).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.enrich(&mut PositionRecord::new("c3d5f8")).await;

        assert_eq!(provider.call_ids(), vec!["c3d5f8", "c3d5f8"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_are_rate_limited() {
        let provider = FakeProvider::new(Reply::Found);
        let mut cache = cache_with(&provider, 300);

        cache.enrich(&mut PositionRecord::new("c45821")).await;
        cache.enrich(&mut PositionRecord::new("c51a22")).await;

        let calls = provider.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].1 - calls[0].1 >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookups_are_also_rate_limited() {
        let provider = FakeProvider::new(Reply::Fail);
        let mut cache = cache_with(&provider, 300);

        cache.enrich(&mut PositionRecord::new("aaa111")).await;
        cache.enrich(&mut PositionRecord::new("bbb222")).await;

        let calls = provider.calls.lock().unwrap().clone();
        assert!(calls[1].1 - calls[0].1 >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_leaves_record_unenriched() {
        let provider = FakeProvider::new(Reply::Fail);
        let mut cache = cache_with(&provider, 300);

        let mut record = PositionRecord::new("c45821");
        cache.enrich(&mut record).await;

        assert!(record.enrichment.is_empty());
        assert!(!cache.is_fresh("c45821"));
        assert_eq!(cache.stats().failures, 1);

        // Not negatively cached, the next attempt goes out again
        cache.enrich(&mut record).await;
        assert_eq!(provider.call_ids().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_is_not_cached() {
        let provider = FakeProvider::new(Reply::Nothing);
        let mut cache = cache_with(&provider, 300);

        let mut record = PositionRecord::new("c51a22");
        cache.enrich(&mut record).await;

        assert!(record.enrichment.is_empty());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_provider_is_noop() {
        let mut cache = EnrichmentCache::new(None, Duration::from_secs(300), Duration::from_secs(1));

        let mut record = PositionRecord::new("c51a22");
        cache.enrich(&mut record).await;

        assert!(record.enrichment.is_empty());
        let stats = cache.stats();
        assert_eq!(stats.lookups, 0);
        assert!(stats.provider.is_none());
        assert!(cache.rate_limiter().last_request().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrich_all_is_serial_in_order() {
        let provider = FakeProvider::new(Reply::Found);
        let mut cache = cache_with(&provider, 300);
        cache.insert("bbb222", australia("bbb222"));

        let mut records = vec![
            PositionRecord::new("ccc333"),
            PositionRecord::new("bbb222"),
            PositionRecord::new("aaa111"),
        ];
        cache.enrich_all(&mut records).await;

        assert_eq!(provider.call_ids(), vec!["ccc333", "aaa111"]);
        assert!(records.iter().all(|r| r.enrichment.origin_country.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_expired() {
        let provider = FakeProvider::new(Reply::Found);
        let mut cache = cache_with(&provider, 10);

        cache.insert("old", australia("old"));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert("new", australia("new"));
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(cache.prune_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.is_fresh("new"));
    }

    #[test]
    fn test_provider_kind_from_name() {
        assert_eq!(ProviderKind::from_name("opensky"), ProviderKind::OpenSky);
        assert_eq!(ProviderKind::from_name(" OpenSky "), ProviderKind::OpenSky);
        assert_eq!(ProviderKind::from_name("adsbexchange"), ProviderKind::AdsbExchange);
        assert_eq!(ProviderKind::from_name("none"), ProviderKind::Disabled);
        assert_eq!(ProviderKind::from_name(""), ProviderKind::Disabled);
        assert_eq!(
            ProviderKind::from_name("flightaware"),
            ProviderKind::Unknown("flightaware".to_string())
        );
    }

    #[test]
    fn test_unknown_provider_builds_disabled_cache() {
        let config = EnrichmentConfig {
            provider: "flightaware".to_string(),
            ..EnrichmentConfig::default()
        };
        let cache = EnrichmentCache::from_config(&config).unwrap();
        assert!(cache.stats().provider.is_none());
    }

    #[test]
    fn test_default_config() {
        let config = EnrichmentConfig::default();
        assert_eq!(config.provider, "opensky");
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.min_request_spacing, Duration::from_secs(1));
    }
}
