// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Outbound side of the chat transport.
//!
//! The messaging platform binding lives outside this crate. Dialogs only see this narrow
//! interface, always behind their rate limiter.

use crate::Error;

use async_trait::async_trait;

/// A single outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Plain text.
    Text(String),
    /// Text with HTML markup.
    Html(String),
}

impl Outgoing {
    pub fn body(&self) -> &str {
        match self {
            Outgoing::Text(text) | Outgoing::Html(text) => text,
        }
    }
}

/// One item of a media batch (album).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Attachment name.
    pub name: String,
    /// Caption, set on the first item of an album only.
    pub caption: Option<String>,
    /// Raw bytes.
    pub data: Vec<u8>,
}

/// Message delivery of the messaging platform.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a single message into the chat.
    async fn send(&self, chat_id: i64, message: Outgoing) -> Result<(), Error>;

    /// Sends a batch of media items as one album.
    async fn send_batch(
        &self,
        chat_id: i64,
        items: Vec<MediaItem>,
    ) -> Result<(), Error>;
}

/// Builds album items from named blobs, putting the caption on the first one.
pub fn album(caption: &str, files: Vec<(String, Vec<u8>)>) -> Vec<MediaItem> {
    files
        .into_iter()
        .enumerate()
        .map(|(index, (name, data))| MediaItem {
            name,
            caption: if index == 0 && !caption.is_empty() {
                Some(caption.to_owned())
            } else {
                None
            },
            data,
        })
        .collect()
}
