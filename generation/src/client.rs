// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Generation client
//!
//! HTTP client of the remote submit/poll job API. A job is submitted once and then polled with a
//! pluggable delay until it reaches a terminal status or the deadline passes. Credential
//! rejections are reported as [`Error::Auth`] at every step; every other transient failure while
//! polling is retried silently until time runs out.
//!
//! The model id is fetched lazily, once per client and credential pair, and reused for every
//! submission made with those credentials.
//!

use crate::{
    config::GenerationConfig,
    error::{Error, Result},
    poll::{JitterInterval, PollStrategy},
    types::{
        Credentials, GenerationRequest, GenerationTask, ModelInfo, RunResponse,
        StatusResponse, TaskStatus,
    },
};

use async_trait::async_trait;
use reqwest::{
    RequestBuilder, Response, StatusCode,
    multipart::{Form, Part},
};
use tokio::{
    sync::OnceCell,
    time::{Instant, sleep},
};
use tracing::{debug, info, warn};
use url::Url;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

/// Something that can produce one image for a request.
///
/// This is the seam the orchestrator drives; tests substitute their own sources.
#[async_trait]
pub trait ImageSource: Send + Sync + 'static {
    async fn generate_one(&self, request: &GenerationRequest) -> Result<Vec<u8>>;
}

/// Client of the remote job API.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    base_url: Url,
    http: reqwest::Client,
    /// Model id per credential pair, each cell written once.
    models: Arc<Mutex<HashMap<Credentials, Arc<OnceCell<i64>>>>>,
    poll: Arc<dyn PollStrategy>,
    wait_timeout: Duration,
}

impl GenerationClient {
    /// Creates a client from settings, polling with a jittered delay.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("Can't build http client: {}", e)))?;
        Ok(Self {
            base_url: config.base_url()?,
            http,
            models: Arc::new(Mutex::new(HashMap::new())),
            poll: Arc::new(JitterInterval::default()),
            wait_timeout: config.wait_timeout(),
        })
    }

    #[must_use]
    pub fn with_poll_strategy(mut self, strategy: impl PollStrategy + 'static) -> Self {
        self.poll = Arc::new(strategy);
        self
    }

    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Cached model id of `credentials`, if already resolved.
    pub fn model(&self, credentials: &Credentials) -> Option<i64> {
        self.lock_models()
            .get(credentials)
            .and_then(|cell| cell.get().copied())
    }

    /// Model id to submit with, fetching the model list on first use of `credentials`.
    pub async fn resolve_model(&self, credentials: &Credentials) -> Result<i64> {
        let cell = self
            .lock_models()
            .entry(credentials.clone())
            .or_default()
            .clone();
        cell.get_or_try_init(|| self.fetch_model(credentials))
            .await
            .copied()
    }

    fn lock_models(&self) -> MutexGuard<'_, HashMap<Credentials, Arc<OnceCell<i64>>>> {
        // The map is only read and extended, a poisoned guard is still consistent.
        self.models.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_model(&self, credentials: &Credentials) -> Result<i64> {
        let url = self.endpoint("models")?;
        let response = self.authorized(self.http.get(url), credentials).send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(Error::Auth),
            StatusCode::OK => {}
            status => {
                return Err(Error::Transport(format!(
                    "Can't receive model: {}",
                    status
                )));
            }
        }
        let models: Vec<ModelInfo> = response.json().await?;
        let model = models
            .first()
            .ok_or_else(|| Error::Protocol("No models found".to_owned()))?;
        info!("Model resolved: {} ({} {}).", model.id, model.name, model.version);
        Ok(model.id)
    }

    /// Submits one job and returns its task id.
    pub async fn submit(&self, request: &GenerationRequest, model: i64) -> Result<String> {
        let url = self.endpoint("text2image/run")?;
        let params = serde_json::to_string(&request.params())
            .map_err(|e| Error::Transport(format!("Can't encode params: {}", e)))?;
        let form = Form::new()
            .part("params", Part::text(params).mime_str("application/json")?)
            .text("model_id", model.to_string());

        let response = self
            .authorized(self.http.post(url), &request.credentials)
            .multipart(form)
            .send()
            .await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(Error::Auth),
            StatusCode::OK | StatusCode::CREATED => {}
            status => {
                return Err(Error::Transport(format!(
                    "Can't run process: {}",
                    status
                )));
            }
        }
        let run: RunResponse = response.json().await?;
        if TaskStatus::parse(&run.status) != TaskStatus::Initial {
            return Err(Error::Protocol(format!(
                "Non initial status for task {}: {}",
                run.uuid, run.status
            )));
        }
        debug!("Task submitted: {}.", run.uuid);
        Ok(run.uuid)
    }

    /// Polls a job until it is terminal or `deadline` passes; returns the first image.
    pub async fn poll(
        &self,
        credentials: &Credentials,
        task_id: &str,
        deadline: Instant,
    ) -> Result<Vec<u8>> {
        let url = self.endpoint(&format!("text2image/status/{}", task_id))?;
        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!("Task {} did not finish in time.", task_id);
                return Err(Error::Timeout);
            }
            sleep(self.poll.next_delay().min(deadline - now)).await;

            let Some(task) = self.status(&url, credentials, task_id).await? else {
                continue;
            };
            match task.status {
                TaskStatus::Initial | TaskStatus::Processing => continue,
                TaskStatus::Fail => {
                    return Err(Error::Generation(task.error.unwrap_or_default()));
                }
                TaskStatus::Done if task.censored => return Err(Error::Censored),
                TaskStatus::Done => {
                    return task.images.into_iter().next().ok_or_else(|| {
                        Error::Protocol(format!("Task {} is done without images", task_id))
                    });
                }
                TaskStatus::Unknown => {
                    warn!("Unknown status of task {}.", task_id);
                }
            }
        }
    }

    /// One status request. `None` means "nothing usable, try again".
    async fn status(
        &self,
        url: &Url,
        credentials: &Credentials,
        task_id: &str,
    ) -> Result<Option<GenerationTask>> {
        let response = match self
            .authorized(self.http.get(url.clone()), credentials)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("Status request of task {} failed: {}", task_id, e);
                return Ok(None);
            }
        };
        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(Error::Auth),
            StatusCode::OK => {}
            status => {
                warn!("Status of task {} answered {}.", task_id, status);
                return Ok(None);
            }
        }
        decode_status(response, task_id).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid endpoint {}: {}", path, e)))
    }

    fn authorized(&self, builder: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
        builder
            .header("X-Key", credentials.key_header())
            .header("X-Secret", credentials.secret_header())
    }
}

/// Decodes a status answer. Undecodable bodies are skipped, invalid images are an error.
async fn decode_status(response: Response, task_id: &str) -> Result<Option<GenerationTask>> {
    let status: StatusResponse = match response.json().await {
        Ok(status) => status,
        Err(e) => {
            debug!("Can't decode status of task {}: {}", task_id, e);
            return Ok(None);
        }
    };
    GenerationTask::try_from(status).map(Some)
}

#[async_trait]
impl ImageSource for GenerationClient {
    async fn generate_one(&self, request: &GenerationRequest) -> Result<Vec<u8>> {
        let model = self.resolve_model(&request.credentials).await?;
        let task = self.submit(request, model).await?;
        self.poll(&request.credentials, &task, Instant::now() + self.wait_timeout)
            .await
    }
}
