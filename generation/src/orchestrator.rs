// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Generation orchestrator
//!
//! A round runs `count` independent generation units through a pool of `tier` workers. The work
//! queue holds one `Work` token per unit followed by one `Stop` token per worker; each worker
//! pulls tokens until it sees `Stop`. Results flow back over a channel and the caller collects
//! exactly `count` of them.
//!
//! A credential rejection in any unit cancels the round: queued and in-flight units resolve to
//! [`Error::Auth`] without calling the remote again.
//!

use crate::{
    client::ImageSource,
    config::GenerationConfig,
    error::{Error, Result},
    types::{GenerationOutcome, GenerationRequest},
};

use tokio::{
    select,
    sync::{Mutex, mpsc},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use std::sync::Arc;

/// Work queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Work,
    Stop,
}

/// Tiered worker pool over an [`ImageSource`].
#[derive(Clone)]
pub struct Orchestrator {
    source: Arc<dyn ImageSource>,
    config: GenerationConfig,
}

impl Orchestrator {
    pub fn new(source: impl ImageSource, config: GenerationConfig) -> Self {
        Self {
            source: Arc::new(source),
            config,
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Runs a round with the tier of `user_id`.
    pub async fn generate_for(
        &self,
        user_id: i64,
        request: &GenerationRequest,
    ) -> GenerationOutcome {
        let tier = self.config.tier_for(user_id);
        if self.config.is_admin(user_id) {
            info!("Admin {} detected, using {} workers.", user_id, tier);
        }
        self.generate(request, tier).await
    }

    /// Runs `request.count` units with at most `tier` of them in flight.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        tier: usize,
    ) -> GenerationOutcome {
        let count = request.count;
        let mut outcome = GenerationOutcome::default();
        if count == 0 {
            return outcome;
        }
        let workers = tier.clamp(1, count);
        info!("Generation round: {} units over {} workers.", count, workers);

        let (token_sender, token_receiver) = mpsc::channel(count + workers);
        let tokens = std::iter::repeat(Token::Work)
            .take(count)
            .chain(std::iter::repeat(Token::Stop).take(workers));
        for token in tokens {
            if let Err(e) = token_sender.try_send(token) {
                error!("Can not queue generation token: {}", e);
            }
        }
        drop(token_sender);

        let token_receiver = Arc::new(Mutex::new(token_receiver));
        let (result_sender, mut result_receiver) = mpsc::channel(count);
        let round = CancellationToken::new();
        let request = Arc::new(request.clone());

        for worker in 0..workers {
            tokio::spawn(run_worker(
                worker,
                self.source.clone(),
                request.clone(),
                token_receiver.clone(),
                result_sender.clone(),
                round.clone(),
            ));
        }
        drop(result_sender);

        while outcome.len() < count {
            match result_receiver.recv().await {
                Some(result) => {
                    outcome.push(result);
                    debug!(
                        "Received results: {} errors, {} images.",
                        outcome.failures.len(),
                        outcome.images.len()
                    );
                }
                None => break,
            }
        }
        // Workers that died mid-unit leave their units unaccounted for.
        while outcome.len() < count {
            outcome.push(Err(Error::Generation(
                "worker stopped before finishing".to_owned(),
            )));
        }
        info!(
            "Generation round finished: {} images, {} failures.",
            outcome.images.len(),
            outcome.failures.len()
        );
        outcome
    }
}

async fn run_worker(
    worker: usize,
    source: Arc<dyn ImageSource>,
    request: Arc<GenerationRequest>,
    tokens: Arc<Mutex<mpsc::Receiver<Token>>>,
    results: mpsc::Sender<Result<Vec<u8>>>,
    round: CancellationToken,
) {
    loop {
        let token = tokens.lock().await.recv().await;
        match token {
            Some(Token::Work) => {
                debug!("Worker {} starts one image.", worker);
                let result = if round.is_cancelled() {
                    Err(Error::Auth)
                } else {
                    select! {
                        biased;
                        _ = round.cancelled() => Err(Error::Auth),
                        result = source.generate_one(&request) => result,
                    }
                };
                if matches!(result, Err(Error::Auth)) {
                    round.cancel();
                }
                if results.send(result).await.is_err() {
                    break;
                }
            }
            Some(Token::Stop) | None => break,
        }
    }
    debug!("Worker {} stopped.", worker);
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::types::Credentials;

    use async_trait::async_trait;
    use tracing_test::traced_test;

    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    /// Tracks how many units run at once; fails the units listed in `failing`.
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        failing: Vec<usize>,
    }

    #[async_trait]
    impl ImageSource for CountingSource {
        async fn generate_one(&self, _request: &GenerationRequest) -> Result<Vec<u8>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.failing.contains(&call) {
                Err(Error::Generation(format!("unit {}", call)))
            } else {
                Ok(vec![call as u8])
            }
        }
    }

    /// Rejects credentials on the first call; later calls hang.
    #[derive(Default)]
    struct RejectingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageSource for RejectingSource {
        async fn generate_one(&self, _request: &GenerationRequest) -> Result<Vec<u8>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(Error::Auth)
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(vec![])
            }
        }
    }

    struct Shared<S>(Arc<S>);

    #[async_trait]
    impl<S: ImageSource> ImageSource for Shared<S> {
        async fn generate_one(&self, request: &GenerationRequest) -> Result<Vec<u8>> {
            self.0.generate_one(request).await
        }
    }

    fn request(count: usize) -> GenerationRequest {
        let mut request =
            GenerationRequest::new(Credentials::new("key", "secret"), "sea view");
        request.count = count;
        request
    }

    #[tokio::test(start_paused = true)]
    async fn test_tier_bounds_concurrency() {
        let source = Arc::new(CountingSource::default());
        let orchestrator =
            Orchestrator::new(Shared(source.clone()), GenerationConfig::default());
        let outcome = orchestrator.generate(&request(5), 2).await;

        assert_eq!(outcome.images.len(), 5);
        assert_eq!(source.calls.load(Ordering::SeqCst), 5);
        assert_eq!(source.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_is_success() {
        let source = Arc::new(CountingSource {
            failing: vec![0, 2],
            ..Default::default()
        });
        let orchestrator =
            Orchestrator::new(Shared(source.clone()), GenerationConfig::default());
        let outcome = orchestrator.generate(&request(4), 4).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.images.len(), 2);
        assert_eq!(outcome.failures.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_joins_reasons() {
        let source = Arc::new(CountingSource {
            failing: vec![0, 1, 2],
            ..Default::default()
        });
        let orchestrator =
            Orchestrator::new(Shared(source.clone()), GenerationConfig::default());
        let outcome = orchestrator.generate(&request(3), 1).await;

        assert_eq!(outcome.failures.len(), 3);
        let Err(Error::AllFailed(reasons)) = outcome.into_result() else {
            panic!("expected an aggregate failure");
        };
        assert_eq!(
            reasons,
            "Can't generate image: unit 0\n\tCan't generate image: unit 1\n\tCan't generate image: unit 2"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_count_and_zero_tier() {
        let source = Arc::new(CountingSource::default());
        let orchestrator =
            Orchestrator::new(Shared(source.clone()), GenerationConfig::default());

        let outcome = orchestrator.generate(&request(0), 3).await;
        assert!(outcome.is_empty());
        assert!(!outcome.is_success());

        let outcome = orchestrator.generate(&request(2), 0).await;
        assert_eq!(outcome.images.len(), 2);
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_auth_failure_cancels_round() {
        let source = Arc::new(RejectingSource::default());
        let orchestrator =
            Orchestrator::new(Shared(source.clone()), GenerationConfig::default());
        let start = tokio::time::Instant::now();
        let outcome = orchestrator.generate(&request(6), 2).await;

        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(outcome.failures.len(), 6);
        assert!(outcome.failures.iter().all(Error::is_auth));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(logs_contain("Generation round: 6 units over 2 workers."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_for_uses_tier() {
        let source = Arc::new(CountingSource::default());
        let config = GenerationConfig::default()
            .with_threads(1, 3)
            .with_admins([99]);
        let orchestrator = Orchestrator::new(Shared(source.clone()), config);

        orchestrator.generate_for(5, &request(3)).await;
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);

        orchestrator.generate_for(99, &request(3)).await;
        assert_eq!(source.peak.load(Ordering::SeqCst), 3);
    }
}
