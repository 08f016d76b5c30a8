// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Generation settings and tier lookup.
//!

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use url::Url;

use std::{collections::HashSet, time::Duration};

/// Default address of the remote job API.
pub const DEFAULT_BASE_URL: &str = "https://api-key.fusionbrain.ai/key/api/v1/";

/// Settings of the generation client and orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base address; endpoints are resolved relative to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Workers per round for regular users.
    #[serde(default = "default_threads_per_client")]
    pub threads_per_client: usize,

    /// Workers per round for admins.
    #[serde(default = "default_threads_per_admin")]
    pub threads_per_admin: usize,

    /// Milliseconds a single image may take, submit to terminal status.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_ms: u64,

    /// User ids with the admin tier.
    #[serde(default)]
    pub admins: HashSet<i64>,

    /// Seconds a single HTTP request may take.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_threads_per_client() -> usize {
    6
}

fn default_threads_per_admin() -> usize {
    25
}

fn default_wait_timeout() -> u64 {
    180_000
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            threads_per_client: default_threads_per_client(),
            threads_per_admin: default_threads_per_admin(),
            wait_timeout_ms: default_wait_timeout(),
            admins: HashSet::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl GenerationConfig {
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_owned();
        self
    }

    #[must_use]
    pub fn with_admins(mut self, admins: impl IntoIterator<Item = i64>) -> Self {
        self.admins = admins.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_threads(mut self, per_client: usize, per_admin: usize) -> Self {
        self.threads_per_client = per_client;
        self.threads_per_admin = per_admin;
        self
    }

    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    /// Concurrency tier of a user.
    pub fn tier_for(&self, user_id: i64) -> usize {
        if self.is_admin(user_id) {
            self.threads_per_admin
        } else {
            self.threads_per_client
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parsed base address, always ending with a slash so endpoints join below it.
    pub fn base_url(&self) -> Result<Url> {
        let raw = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };
        Url::parse(&raw).map_err(|e| {
            Error::Config(format!("Invalid base url {}: {}", self.base_url, e))
        })
    }
}
