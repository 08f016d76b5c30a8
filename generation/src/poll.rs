// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Delays between two status polls of a remote job.
//!

use rand::Rng;

use std::{fmt::Debug, time::Duration};

/// Trait to define a poll delay strategy.
pub trait PollStrategy: Debug + Send + Sync {
    /// Delay before the next status request.
    fn next_delay(&self) -> Duration;
}

/// Polls again immediately.
#[derive(Debug, Default)]
pub struct NoInterval;

impl PollStrategy for NoInterval {
    fn next_delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Polls at a fixed interval.
#[derive(Debug)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    pub fn new(duration: Duration) -> Self {
        FixedInterval { duration }
    }
}

impl PollStrategy for FixedInterval {
    fn next_delay(&self) -> Duration {
        self.duration
    }
}

/// Polls after a delay drawn uniformly from `[min, max)`.
///
/// The default, one to nine seconds, spreads the polls of a round's workers over time.
#[derive(Debug)]
pub struct JitterInterval {
    min: Duration,
    max: Duration,
}

impl JitterInterval {
    pub fn new(min: Duration, max: Duration) -> Self {
        JitterInterval { min, max }
    }
}

impl Default for JitterInterval {
    fn default() -> Self {
        JitterInterval::new(Duration::from_secs(1), Duration::from_secs(9))
    }
}

impl PollStrategy for JitterInterval {
    fn next_delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..max))
    }
}
