// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Per-dialog pacing of outbound operations.
//!

use tokio::time::{Instant, sleep};
use tracing::debug;

use std::time::Duration;

/// Keeps consecutive sends of one dialog at least `interval` apart.
///
/// Only the owning dialog waits; the limiter is never shared between dialogs.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Suspends the caller until the minimum interval since the last send has passed.
    pub async fn before_send(&self) {
        if let Some(last_sent) = self.last_sent {
            let elapsed = last_sent.elapsed();
            if elapsed < self.interval {
                let pause = self.interval - elapsed;
                debug!("Rate limit: pausing for {:?}.", pause);
                sleep(pause).await;
            }
        }
    }

    /// Records that a send has just completed.
    pub fn after_send(&mut self) {
        self.last_sent = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_send_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let start = Instant::now();
        limiter.before_send().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_sends_are_spaced() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100));
        let mut stamps = Vec::new();
        for _ in 0..5 {
            limiter.before_send().await;
            stamps.push(Instant::now());
            limiter.after_send();
        }
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sender_is_not_delayed() {
        let mut limiter = RateLimiter::new(Duration::from_millis(100));
        limiter.after_send();
        sleep(Duration::from_millis(250)).await;
        let start = Instant::now();
        limiter.before_send().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        limiter.after_send();
        let start = Instant::now();
        limiter.before_send().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
