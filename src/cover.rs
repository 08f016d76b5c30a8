// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Cover conversation
//!
//! Sample application on top of the runtime: a chat that keeps a per-user generation profile
//! and turns it into a batch of images on `/run`.
//!
//! Each dialog handles one command (plus the follow-up answers the command asks for) and ends,
//! so the profile is written back after every command that changed it.
//!

use dialog::{Conversation, Dialog, Error, Identity, Session};
use generation::{
    Credentials, GenerationClient, GenerationConfig, GenerationRequest, Orchestrator,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Images per album message.
pub const MAX_ALBUM_ITEMS: usize = 9;
/// Longest accepted prompt, in characters.
pub const MAX_PROMPT_LEN: usize = 1000;
/// Accepted image side, in pixels.
pub const SIDE_RANGE: std::ops::RangeInclusive<u32> = 100..=1024;
/// Accepted number of images per run.
pub const COUNT_RANGE: std::ops::RangeInclusive<usize> = 1..=50;

/// Generation settings of one user in one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub prompt: String,
    pub negative: String,
    pub count: usize,
    pub width: u32,
    pub height: u32,
    pub key: String,
    pub secret: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            prompt: "A beautiful sea view from a window".to_owned(),
            negative: "Acid colors".to_owned(),
            count: 18,
            width: 680,
            height: 1024,
            key: String::new(),
            secret: String::new(),
        }
    }
}

impl Profile {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.key, &self.secret)
    }

    /// Request for one `/run` with the current settings.
    pub fn request(&self) -> GenerationRequest {
        let mut request = GenerationRequest::new(self.credentials(), &self.prompt);
        request.count = self.count;
        request.width = self.width;
        request.height = self.height;
        request.negative_prompt = self.negative.clone();
        request
    }
}

impl Session for Profile {
    fn fresh(_identity: &Identity) -> Self {
        Profile::default()
    }

    fn encode(&self) -> Result<Vec<u8>, Error> {
        bincode::serialize(self).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode(_identity: &Identity, bytes: &[u8]) -> Result<Self, Error> {
        bincode::deserialize(bytes).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Conversation texts.
mod texts {
    use super::{Profile, escape};

    pub const FIRST_START: &str = "<b>Hello!</b> I draw covers for your posts.\n\
        Send /access_keys to set your API key and secret, then /run.\n\
        /status shows your current settings.";
    pub const UNKNOWN: &str = "I don't understand. Send /status to see what I can do.";
    pub const NOT_A_NUMBER: &str = "That is not a number.";
    pub const ACCESS_ERROR: &str =
        "API key and secret are not set. Send /access_keys first.";
    pub const PLEASE_WAIT: &str = "Generating images, please wait...";
    pub const PART_DONE: &str = "Part of the images is ready.";
    pub const DONE: &str = "All images are ready.";
    pub const ASK_KEY: &str =
        "Send your API key (32 hex characters), /ok to keep it or /clean to remove it.";
    pub const ASK_SECRET: &str =
        "Send your API secret (32 hex characters), /ok to keep it or /clean to remove it.";
    pub const FAQ: &str = "<b>How long does it take?</b> Usually a minute, sometimes up to three.\n\
        <b>Why did an image fail?</b> The service may censor a picture or reject a busy request; \
        the other images are still sent.\n\
        <b>Where are my keys kept?</b> Only in your settings, send /access_keys and /clean to remove them.";

    pub fn access(profile: &Profile) -> String {
        format!(
            "Images are drawn by a remote service with your own API key and secret. \
             Register there, create a key and send both with /access_keys.\n\n\
             <b>Key:</b> {}\n<b>Secret:</b> {}",
            if profile.key.is_empty() { "not set" } else { "set" },
            if profile.secret.is_empty() { "not set" } else { "set" },
        )
    }

    pub fn status(profile: &Profile) -> String {
        format!(
            "<b>Task:</b> {}\n<b>Avoid:</b> {}\n<b>Images:</b> {} (/count)\n\
             <b>Size:</b> {}x{} (/width, /height)\n<b>Access:</b> {} (/access_keys)\n\n\
             /ai_task, /ai_avoid to change the prompts, /run to generate.",
            escape(&profile.prompt),
            escape(&profile.negative),
            profile.count,
            profile.width,
            profile.height,
            if profile.credentials().is_complete() {
                "set"
            } else {
                "not set"
            },
        )
    }

    pub fn ask_number(what: &str, current: impl std::fmt::Display) -> String {
        format!("Current {} is {}. Send a new value.", what, current)
    }

    pub fn ask_prompt(what: &str, current: &str) -> String {
        format!(
            "Current {}:\n<i>{}</i>\nSend a new text or /ok to keep it.",
            what,
            escape(current)
        )
    }

    pub fn wrong(reason: &str) -> String {
        format!("Wrong value: {}.", reason)
    }

    pub fn too_long(length: usize, max: usize) -> String {
        format!("The text is too long: {} characters, at most {} allowed.", length, max)
    }

    pub fn failed(error: &generation::Error) -> String {
        format!("Something went wrong:\n{}", escape(&error.to_string()))
    }
}

/// HTML-escapes user provided text.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn is_api_key(value: &str) -> bool {
    value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Which part of the credentials an `/access_keys` step edits.
#[derive(Clone, Copy)]
enum KeyPart {
    Key,
    Secret,
}

/// The cover conversation.
pub struct CoverConversation {
    orchestrator: Orchestrator,
}

impl CoverConversation {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Conversation generating through the remote API described by `config`.
    pub fn from_config(config: GenerationConfig) -> Result<Self, generation::Error> {
        let client = GenerationClient::new(&config)?;
        Ok(Self::new(Orchestrator::new(client, config)))
    }

    async fn side(
        &self,
        dialog: &mut Dialog,
        profile: &mut Profile,
        command: &str,
    ) -> Result<(), Error> {
        let (what, current) = if command == "/width" {
            ("width", profile.width)
        } else {
            ("height", profile.height)
        };
        dialog
            .send_html(&texts::ask_number(what, current))
            .await?;
        let Ok(value) = dialog.text().await?.trim().parse::<u32>() else {
            return dialog.send_html(texts::NOT_A_NUMBER).await;
        };
        if !SIDE_RANGE.contains(&value) {
            return dialog
                .send_html(&texts::wrong(&format!(
                    "must be between {} and {}",
                    SIDE_RANGE.start(),
                    SIDE_RANGE.end()
                )))
                .await;
        }
        if command == "/width" {
            profile.width = value;
        } else {
            profile.height = value;
        }
        dialog.send_html(&texts::status(profile)).await
    }

    async fn count(&self, dialog: &mut Dialog, profile: &mut Profile) -> Result<(), Error> {
        dialog
            .send_html(&texts::ask_number("number of images", profile.count))
            .await?;
        let Ok(value) = dialog.text().await?.trim().parse::<usize>() else {
            return dialog.send_html(texts::NOT_A_NUMBER).await;
        };
        if !COUNT_RANGE.contains(&value) {
            return dialog
                .send_html(&texts::wrong(&format!(
                    "must be between {} and {}",
                    COUNT_RANGE.start(),
                    COUNT_RANGE.end()
                )))
                .await;
        }
        profile.count = value;
        dialog.send_html(&texts::status(profile)).await
    }

    async fn prompt(
        &self,
        dialog: &mut Dialog,
        profile: &mut Profile,
        command: &str,
    ) -> Result<(), Error> {
        let avoid = command == "/ai_avoid";
        let (what, current) = if avoid {
            ("things to avoid", &profile.negative)
        } else {
            ("task", &profile.prompt)
        };
        dialog.send_html(&texts::ask_prompt(what, current)).await?;
        let value = dialog.text().await?;
        if value != "/ok" {
            let length = value.chars().count();
            if length > MAX_PROMPT_LEN {
                return dialog
                    .send_html(&texts::too_long(length, MAX_PROMPT_LEN))
                    .await;
            }
            if avoid {
                profile.negative = value;
            } else {
                profile.prompt = value;
            }
        }
        dialog.send_html(&texts::status(profile)).await
    }

    async fn access_keys(
        &self,
        dialog: &mut Dialog,
        profile: &mut Profile,
    ) -> Result<(), Error> {
        for part in [KeyPart::Key, KeyPart::Secret] {
            let ask = match part {
                KeyPart::Key => texts::ASK_KEY,
                KeyPart::Secret => texts::ASK_SECRET,
            };
            dialog.send_html(ask).await?;
            let value = dialog.text().await?;
            let slot = match part {
                KeyPart::Key => &mut profile.key,
                KeyPart::Secret => &mut profile.secret,
            };
            match value.as_str() {
                "/ok" => {}
                "/clean" => slot.clear(),
                value if is_api_key(value) => *slot = value.to_owned(),
                _ => {
                    return dialog
                        .send_html(&texts::wrong("must be 32 hex characters"))
                        .await;
                }
            }
        }
        dialog.send_html(&texts::status(profile)).await
    }

    async fn generate(&self, dialog: &mut Dialog, profile: &Profile) -> Result<(), Error> {
        if !profile.credentials().is_complete() {
            return dialog.send_html(texts::ACCESS_ERROR).await;
        }
        dialog.send_html(texts::PLEASE_WAIT).await?;

        let outcome = self
            .orchestrator
            .generate_for(dialog.user_id(), &profile.request())
            .await;
        info!(
            "Run of {} finished: {} images, {} failures.",
            dialog.identity(),
            outcome.images.len(),
            outcome.failures.len()
        );
        let images = match outcome.into_result() {
            Ok(images) => images,
            Err(e) => return dialog.send_html(&texts::failed(&e)).await,
        };

        let albums = images.chunks(MAX_ALBUM_ITEMS).count();
        for (index, chunk) in images.chunks(MAX_ALBUM_ITEMS).enumerate() {
            let caption = if index + 1 < albums {
                texts::PART_DONE
            } else {
                texts::DONE
            };
            let files = chunk
                .iter()
                .enumerate()
                .map(|(i, image)| (format!("image-{}.png", i), image.clone()))
                .collect();
            dialog.send_album(caption, files).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Conversation<Profile> for CoverConversation {
    async fn run(&self, dialog: &mut Dialog, profile: &mut Profile) -> Result<(), Error> {
        let command = dialog.text().await?;
        debug!("Command {} from {}.", command, dialog.identity());
        match command.as_str() {
            "/start" => dialog.send_html(texts::FIRST_START).await,
            "/status" => dialog.send_html(&texts::status(profile)).await,
            "/access" => dialog.send_html(&texts::access(profile)).await,
            "/faq" => dialog.send_html(texts::FAQ).await,
            "/width" | "/height" => self.side(dialog, profile, &command).await,
            "/count" => self.count(dialog, profile).await,
            "/ai_task" | "/ai_avoid" => self.prompt(dialog, profile, &command).await,
            "/access_keys" => self.access_keys(dialog, profile).await,
            "/run" => self.generate(dialog, profile).await,
            _ => dialog.send_html(texts::UNKNOWN).await,
        }
    }
}
