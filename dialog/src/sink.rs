// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Dialog lifecycle notifications.
//!
//! The registry broadcasts a [`DialogEvent`] whenever a dialog starts or terminates. A [`Sink`]
//! runs in its own task and hands every notification to a [`Subscriber`].

use crate::Identity;

use async_trait::async_trait;
use tokio::sync::broadcast::{Receiver as EventReceiver, error::RecvError};

use tracing::debug;

/// Why a dialog terminated.
#[derive(Debug, Clone, PartialEq)]
pub enum Exit {
    /// The conversation handler returned.
    Finished,
    /// The inactivity deadline elapsed.
    TimedOut,
    /// The process-wide cancellation fired.
    Cancelled,
    /// The handler failed or panicked.
    Faulted(String),
    /// The session could not be loaded.
    LoadFailed(String),
}

impl Exit {
    /// Whether events still queued at termination should start a new dialog.
    pub(crate) fn reroutes_pending(&self) -> bool {
        !matches!(self, Exit::LoadFailed(_) | Exit::Cancelled)
    }
}

/// Lifecycle notification published by the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogEvent {
    Started { identity: Identity },
    Terminated { identity: Identity, exit: Exit },
}

/// A sink that receives dialog notifications and hands them to a subscriber.
pub struct Sink {
    /// The subscriber that will be notified of events.
    subscriber: Box<dyn Subscriber>,
    /// The broadcast receiver for dialog events.
    event_receiver: EventReceiver<DialogEvent>,
}

impl Sink {
    /// Creates a new Sink with the given event receiver and subscriber.
    pub fn new(
        event_receiver: EventReceiver<DialogEvent>,
        subscriber: impl Subscriber,
    ) -> Self {
        Sink {
            subscriber: Box::new(subscriber),
            event_receiver,
        }
    }

    /// Runs the sink's event processing loop until the channel closes.
    ///
    /// Lagging receivers skip the missed notifications and keep going.
    pub async fn run(&mut self) {
        loop {
            match self.event_receiver.recv().await {
                Ok(event) => {
                    debug!(
                        "Received event: {:?}. Notify to the subscriber.",
                        event
                    );
                    self.subscriber.notify(event).await;
                }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Sink lagged, {} events skipped.", skipped);
                    continue;
                }
            }
        }
    }
}

/// Receives dialog notifications from a [`Sink`].
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    async fn notify(&self, event: DialogEvent);
}

#[cfg(test)]
mod tests {

    use super::*;

    use std::sync::Arc;
    use tokio::sync::{Mutex, broadcast};

    #[derive(Clone, Default)]
    struct Collector(Arc<Mutex<Vec<DialogEvent>>>);

    #[async_trait]
    impl Subscriber for Collector {
        async fn notify(&self, event: DialogEvent) {
            self.0.lock().await.push(event);
        }
    }

    #[tokio::test]
    async fn test_sink_delivers_until_closed() {
        let (sender, receiver) = broadcast::channel(4);
        let collector = Collector::default();
        let mut sink = Sink::new(receiver, collector.clone());
        let identity = Identity::new("bot", 1, 2);

        sender
            .send(DialogEvent::Started {
                identity: identity.clone(),
            })
            .unwrap();
        sender
            .send(DialogEvent::Terminated {
                identity: identity.clone(),
                exit: Exit::TimedOut,
            })
            .unwrap();
        drop(sender);

        sink.run().await;
        let events = collector.0.lock().await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            DialogEvent::Terminated {
                identity,
                exit: Exit::TimedOut
            }
        );
    }

    #[test]
    fn test_exit_reroute_policy() {
        assert!(Exit::Finished.reroutes_pending());
        assert!(Exit::TimedOut.reroutes_pending());
        assert!(Exit::Faulted("boom".to_owned()).reroutes_pending());
        assert!(!Exit::Cancelled.reroutes_pending());
        assert!(!Exit::LoadFailed("io".to_owned()).reroutes_pending());
    }
}
