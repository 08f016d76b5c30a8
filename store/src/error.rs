// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Store error types
//!
//! Backends report missing entries as [`Error::EntryNotFound`], which the session store treats
//! as a normal condition (a conversation seen for the first time). Every other variant is a real
//! failure and crosses into the dialog runtime as `dialog::Error::Load` or `dialog::Error::Store`.
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for session storage.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq)]
pub enum Error {
    /// Backend creation or initialization failure.
    #[error("Can't create store: {0}")]
    CreateStore(String),

    /// Data retrieval failure.
    #[error("Get error: {0}")]
    Get(String),

    /// No entry is stored under the requested key.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Write, delete or encryption failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl Error {
    /// Converts a failure while loading into the dialog runtime's error.
    pub fn into_load(self) -> dialog::Error {
        dialog::Error::Load(self.to_string())
    }

    /// Converts a failure while storing into the dialog runtime's error.
    pub fn into_store(self) -> dialog::Error {
        dialog::Error::Store(self.to_string())
    }
}
