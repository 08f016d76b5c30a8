// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Dialog runtime settings.
//!

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Settings shared by every dialog a router spawns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogConfig {
    /// Milliseconds a dialog waits for the next event before ending.
    #[serde(default = "default_inactive_timeout")]
    pub inactive_timeout_ms: u64,

    /// Capacity of each dialog's inbound queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum outbound operations per second for one dialog (0 disables pacing).
    #[serde(default = "default_send_rps_limit")]
    pub send_rps_limit: u32,
}

fn default_inactive_timeout() -> u64 {
    900_000
}

fn default_queue_capacity() -> usize {
    128
}

fn default_send_rps_limit() -> u32 {
    10
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            inactive_timeout_ms: default_inactive_timeout(),
            queue_capacity: default_queue_capacity(),
            send_rps_limit: default_send_rps_limit(),
        }
    }
}

impl DialogConfig {
    #[must_use]
    pub fn with_inactive_timeout(mut self, timeout: Duration) -> Self {
        self.inactive_timeout_ms = duration_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_send_rps_limit(mut self, limit: u32) -> Self {
        self.send_rps_limit = limit;
        self
    }

    pub fn inactive_timeout(&self) -> Duration {
        Duration::from_millis(self.inactive_timeout_ms)
    }

    /// Minimum interval between two sends of one dialog.
    pub fn send_interval(&self) -> Duration {
        if self.send_rps_limit == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / self.send_rps_limit
        }
    }

    /// Queue capacity, never zero.
    pub(crate) fn capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

/// Whole milliseconds of `duration`, saturating.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
