// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dialog identity
//!
//! The `identity` module provides the `Identity` type, the composite key that distinguishes one
//! conversation, and the inbound `Event` delivered to it.
//!

use serde::{Deserialize, Serialize};

use std::fmt::{Error, Formatter};
use std::time::SystemTime;

/// Composite key of a conversation: the bot instance, the chat and the user.
///
/// Two events with the same identity always reach the same live dialog.
#[derive(
    Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Identity {
    bot: String,
    chat_id: i64,
    user_id: i64,
}

impl Identity {
    /// Creates a new identity.
    pub fn new(bot: &str, chat_id: i64, user_id: i64) -> Self {
        Self {
            bot: bot.to_owned(),
            chat_id,
            user_id,
        }
    }

    /// Identity of the conversation an event belongs to.
    pub fn of(bot: &str, event: &Event) -> Self {
        Self::new(bot, event.chat_id, event.user_id)
    }

    pub fn bot(&self) -> &str {
        &self.bot
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Stable key used by persistence backends.
    pub fn key(&self) -> String {
        format!("bot-{}.chat-{}.user-{}", self.bot, self.chat_id, self.user_id)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}:[{}]:[{}]", self.bot, self.chat_id, self.user_id)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self)
    }
}

/// One inbound chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub chat_id: i64,
    pub user_id: i64,
    pub text: String,
    pub timestamp: SystemTime,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn new(chat_id: i64, user_id: i64, text: &str) -> Self {
        Self {
            chat_id,
            user_id,
            text: text.to_owned(),
            timestamp: SystemTime::now(),
        }
    }
}
