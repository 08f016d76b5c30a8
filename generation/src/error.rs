// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! Per-unit failures of a generation round are kept as values inside the round's outcome. Only
//! the aggregate [`Error::AllFailed`] is surfaced when no unit produced an image.
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the generation client and orchestrator.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The remote rejected the key or the secret.
    #[error("Wrong key or secret.")]
    Auth,
    /// The remote answered something the protocol does not allow.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// Network, status code or decoding failure.
    #[error("Transport error: {0}")]
    Transport(String),
    /// No terminal status before the deadline.
    #[error("Timeout exceeded.")]
    Timeout,
    /// The image was produced but withheld by moderation.
    #[error("The image did not pass moderation.")]
    Censored,
    /// The remote job failed.
    #[error("Can't generate image: {0}")]
    Generation(String),
    /// No unit of a round produced an image.
    #[error("Nothing succeeded:\n\t{0}")]
    AllFailed(String),
    /// Invalid settings.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for credential rejections, which end a whole round.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth)
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Transport(error.to_string())
    }
}

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
