// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Store module.
//!
//! Session persistence for the dialog runtime: storage backends and the
//! change-detecting, optionally encrypted, session store.
//!

pub mod backend;
pub mod error;
pub mod file;
pub mod memory;
pub mod session;

pub use backend::Backend;
pub use error::Error;
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use session::SessionStore;
