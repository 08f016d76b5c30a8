// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dialog runtime
//!
//! A per-conversation actor runtime for chat bots. Every conversation, identified by the bot
//! instance, the chat and the user, is served by exactly one lightweight task (a *dialog*) that
//! owns the conversation's session state, pulls inbound events from its own bounded queue and
//! sends replies through a per-dialog rate limiter.
//!
//! ## Overview
//!
//! ```text
//!  inbound events ──> Router::route ──> Registry (identity → queue) ──> Dialog task
//!                                                                         │
//!                       Transport <── RateLimiter <── Conversation::run ──┘
//! ```
//!
//! - The [`Registry`] is an explicit service value. Its lock is held only for lookup, insert and
//!   delete, never while waiting on a dialog.
//! - A dialog ends when its handler returns, when it waits longer than the inactivity timeout, when
//!   the cancellation signal fires, or when its handler faults. Faults, panics included, are
//!   contained in the dialog: the process keeps routing.
//! - At termination the final session is offered to the [`Persistence`] collaborator, the dialog
//!   deregisters and events that were still queued are routed again.
//! - Lifecycle notifications ([`DialogEvent`]) are broadcast by the registry and can be consumed
//!   with a [`Sink`].
//!
//! ## Getting Started
//!
//! ```ignore
//! use dialog::{Conversation, Dialog, DialogConfig, Error, Registry, Router};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Conversation<Notes> for Echo {
//!     async fn run(&self, dialog: &mut Dialog, _session: &mut Notes) -> Result<(), Error> {
//!         loop {
//!             let text = dialog.text().await?;
//!             dialog.send_text(&text).await?;
//!         }
//!     }
//! }
//!
//! let router = Router::new(Registry::new(), Echo, transport, DialogConfig::default(), token);
//! router.dispatch("echo", event).await?;
//! ```
//!

mod config;
mod dialog;
mod error;
mod identity;
mod limiter;
mod registry;
mod runner;
mod session;
mod sink;
mod transport;

pub use config::DialogConfig;
pub use dialog::{Conversation, Dialog, DialogLifecycle, Wait};
pub use error::Error;
pub use identity::{Event, Identity};
pub use limiter::RateLimiter;
pub use registry::{Registry, Router};
pub use session::{Fingerprint, Persistence, Session};
pub use sink::{DialogEvent, Exit, Sink, Subscriber};
pub use transport::{MediaItem, Outgoing, Transport, album};
