// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Requests, wire messages and outcomes of the remote job API.
//!

use crate::error::{Error, Result};

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

/// Key and secret of the remote API.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(key: &str, secret: &str) -> Self {
        Self {
            key: key.to_owned(),
            secret: secret.to_owned(),
        }
    }

    /// Both parts are set.
    pub fn is_complete(&self) -> bool {
        !self.key.is_empty() && !self.secret.is_empty()
    }

    pub(crate) fn key_header(&self) -> String {
        format!("Key {}", self.key)
    }

    pub(crate) fn secret_header(&self) -> String {
        format!("Secret {}", self.secret)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"***")
            .finish()
    }
}

/// One "/run" worth of generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub credentials: Credentials,
    /// Number of images wanted; each one is a separate remote job.
    pub count: usize,
    pub width: u32,
    pub height: u32,
    pub prompt: String,
    /// Empty when nothing should be avoided.
    pub negative_prompt: String,
    pub style: String,
}

impl GenerationRequest {
    /// A single default-sized image for `prompt`.
    pub fn new(credentials: Credentials, prompt: &str) -> Self {
        Self {
            credentials,
            count: 1,
            width: 680,
            height: 1024,
            prompt: prompt.to_owned(),
            negative_prompt: String::new(),
            style: "DEFAULT".to_owned(),
        }
    }

    pub(crate) fn params(&self) -> GenerationParams<'_> {
        GenerationParams {
            kind: "GENERATE",
            style: &self.style,
            width: self.width,
            height: self.height,
            num_images: 1,
            negative_prompt: &self.negative_prompt,
            generate_params: GenerateParams {
                query: &self.prompt,
            },
        }
    }
}

/// JSON `params` part of a submission.
#[derive(Debug, Serialize)]
pub(crate) struct GenerationParams<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    style: &'a str,
    width: u32,
    height: u32,
    num_images: u32,
    #[serde(
        rename = "negativePromptUnclip",
        skip_serializing_if = "str::is_empty"
    )]
    negative_prompt: &'a str,
    #[serde(rename = "generateParams")]
    generate_params: GenerateParams<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateParams<'a> {
    query: &'a str,
}

/// Entry of the model list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelInfo {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: f64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Status of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Initial,
    Processing,
    Done,
    Fail,
    Unknown,
}

impl TaskStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "INITIAL" => TaskStatus::Initial,
            "PROCESSING" => TaskStatus::Processing,
            "DONE" => TaskStatus::Done,
            "FAIL" => TaskStatus::Fail,
            _ => TaskStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Fail)
    }
}

/// Answer to a submission.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RunResponse {
    pub uuid: String,
    pub status: String,
}

/// Answer to a status request.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusResponse {
    pub uuid: String,
    pub status: String,
    /// Base64 encoded images.
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(rename = "errorDescription", default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub censored: bool,
}

/// Remote job handle as seen by the last poll.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTask {
    pub id: String,
    pub status: TaskStatus,
    pub images: Vec<Vec<u8>>,
    pub error: Option<String>,
    pub censored: bool,
}

impl TryFrom<StatusResponse> for GenerationTask {
    type Error = Error;

    fn try_from(response: StatusResponse) -> Result<Self> {
        let images = response
            .images
            .unwrap_or_default()
            .iter()
            .map(|image| {
                general_purpose::STANDARD.decode(image).map_err(|e| {
                    Error::Protocol(format!("Invalid image encoding: {}", e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: response.uuid,
            status: TaskStatus::parse(&response.status),
            images,
            error: response.error_description,
            censored: response.censored,
        })
    }
}

/// Result of a generation round: every image and every failure, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutcome {
    pub images: Vec<Vec<u8>>,
    pub failures: Vec<Error>,
}

impl GenerationOutcome {
    pub fn push(&mut self, result: Result<Vec<u8>>) {
        match result {
            Ok(image) => self.images.push(image),
            Err(error) => self.failures.push(error),
        }
    }

    /// Number of units accounted for.
    pub fn len(&self) -> usize {
        self.images.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// At least one image was produced.
    pub fn is_success(&self) -> bool {
        !self.images.is_empty()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }

    /// The images, or `AllFailed` with every reason when there are none.
    pub fn into_result(self) -> Result<Vec<Vec<u8>>> {
        if self.is_success() {
            Ok(self.images)
        } else {
            Err(Error::AllFailed(self.reasons().join("\n\t")))
        }
    }
}
