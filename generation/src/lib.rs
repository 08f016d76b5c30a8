// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Image generation
//!
//! Client and tiered orchestrator for a remote long-running job API: a job is submitted, polled
//! until it reaches a terminal status, and its first image is returned.
//!
//! - [`GenerationClient`] talks to the remote API: it resolves (and caches) the model id,
//!   submits jobs and polls them with a [`PollStrategy`] until done, failed or timed out.
//! - [`Orchestrator`] runs `count` units through at most `tier` concurrent workers and
//!   aggregates every image and every failure into a [`GenerationOutcome`]. The tier of a user
//!   comes from [`GenerationConfig::tier_for`].
//!
//! ```ignore
//! let config = GenerationConfig::default().with_admins([42]);
//! let client = GenerationClient::new(&config)?;
//! let orchestrator = Orchestrator::new(client, config);
//! let images = orchestrator.generate_for(user_id, &request).await.into_result()?;
//! ```
//!

mod client;
mod config;
mod error;
mod orchestrator;
mod poll;
mod types;

pub use client::{GenerationClient, ImageSource};
pub use config::{DEFAULT_BASE_URL, GenerationConfig};
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use poll::{FixedInterval, JitterInterval, NoInterval, PollStrategy};
pub use types::{
    Credentials, GenerationOutcome, GenerationRequest, GenerationTask, ModelInfo,
    TaskStatus,
};
