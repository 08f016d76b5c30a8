// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the dialog runtime.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The transport failed to deliver an outgoing message.
    #[error("An error occurred while sending a message: {0}.")]
    Send(String),
    /// The inactivity deadline elapsed while waiting for the next event.
    #[error("Dialog timeout exceeded.")]
    DialogTimeout,
    /// The process-wide cancellation signal fired while waiting.
    #[error("Dialog cancelled.")]
    Cancelled,
    /// The router no longer accepts events.
    #[error("The dialog router is stopped.")]
    Stopped,
    /// An unrecovered fault inside a conversation handler.
    #[error("Dialog fault: {0}")]
    Fault(String),
    /// The session could not be loaded.
    #[error("Can't load session: {0}")]
    Load(String),
    /// The session could not be stored.
    #[error("Can't store session: {0}")]
    Store(String),
    /// The session could not be encoded.
    #[error("Can't encode session: {0}")]
    Encode(String),
    /// The session could not be decoded.
    #[error("Can't decode session: {0}")]
    Decode(String),
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// True for the two waits that end a conversation without a fault.
    pub fn is_session_end(&self) -> bool {
        matches!(self, Error::DialogTimeout | Error::Cancelled)
    }
}
