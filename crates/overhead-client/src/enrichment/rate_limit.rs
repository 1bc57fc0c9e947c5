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

//! Minimum-spacing limiter for outbound provider requests.

use std::time::Duration;

use log::debug;
use tokio::time::{sleep, Instant};

/// Enforces a minimum gap between consecutive outbound requests.
#[derive(Debug)]
pub struct RateLimiter {
    min_spacing: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_request: None,
        }
    }

    #[must_use]
    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// When the last request was let through.
    #[must_use]
    pub fn last_request(&self) -> Option<Instant> {
        self.last_request
    }

    /// How long a request issued now would have to wait.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.last_request.map_or(Duration::ZERO, |last| {
            self.min_spacing.saturating_sub(last.elapsed())
        })
    }

    /// Wait until the spacing allows another request, then claim the slot.
    pub async fn acquire(&mut self) {
        let wait = self.remaining();
        if !wait.is_zero() {
            debug!("Rate limiting provider request for {} ms", wait.as_millis());
            sleep(wait).await;
        }
        self.last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.last_request(), Some(start));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_requests_are_spaced() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));

        limiter.acquire().await;
        let first = Instant::now();
        limiter.acquire().await;
        let second = Instant::now();

        assert!(second - first >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_spacing_elapsed() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire().await;

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(limiter.remaining(), Duration::ZERO);

        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_wait() {
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire().await;

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(limiter.remaining(), Duration::from_millis(600));
    }
}
