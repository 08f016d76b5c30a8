// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dialog registry and router
//!
//! The `Registry` is the process-wide map from identity to live dialog. It is an explicit service
//! value created by the process root and injected into the `Router`, which routes inbound events
//! to the right dialog and spawns one when none is registered.
//!
//! The map is guarded by a single mutex that is held for lookup, insert and delete, and while a
//! terminating dialog hands its queued events to its successor. The check-then-insert step for a
//! new identity runs under that mutex, so concurrent events for an unseen identity create exactly
//! one dialog. Delivery into the dialog's bounded queue happens after the lock is released and
//! waits when the queue is full.
//!

use crate::{
    DialogConfig, Error, Event, Identity,
    dialog::{Conversation, Dialog},
    runner::DialogRunner,
    session::{Persistence, Session},
    sink::{DialogEvent, Exit, Sink},
    transport::Transport,
};

use tokio::sync::{Mutex, broadcast, mpsc, mpsc::error::SendError};
use tokio_util::sync::CancellationToken;

use tracing::{debug, warn};

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Registered dialog: its queue sender and registration id.
struct Entry {
    id: u64,
    sender: mpsc::Sender<Event>,
}

/// Process-wide map of live dialogs.
#[derive(Clone)]
pub struct Registry {
    /// The dialogs running in this process.
    dialogs: Arc<Mutex<HashMap<Identity, Entry>>>,
    /// Registration ids, also the number of dialogs ever registered.
    next_id: Arc<AtomicU64>,
    /// Lifecycle notifications.
    events: broadcast::Sender<DialogEvent>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            dialogs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    /// Number of live dialogs.
    pub async fn len(&self) -> usize {
        self.dialogs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.dialogs.lock().await.is_empty()
    }

    /// True if a dialog is registered for `identity`.
    pub async fn contains(&self, identity: &Identity) -> bool {
        self.dialogs.lock().await.contains_key(identity)
    }

    /// Number of dialogs ever registered.
    pub fn created_total(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Subscribes to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DialogEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: DialogEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Routes inbound events to dialogs, spawning them on demand.
pub struct Router<S: Session> {
    registry: Registry,
    conversation: Arc<dyn Conversation<S>>,
    transport: Arc<dyn Transport>,
    persistence: Option<Arc<dyn Persistence<S>>>,
    config: DialogConfig,
    token: CancellationToken,
}

impl<S: Session> Clone for Router<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            conversation: self.conversation.clone(),
            transport: self.transport.clone(),
            persistence: self.persistence.clone(),
            config: self.config.clone(),
            token: self.token.clone(),
        }
    }
}

impl<S: Session> Router<S> {
    /// Creates a router over an existing registry.
    pub fn new(
        registry: Registry,
        conversation: impl Conversation<S>,
        transport: impl Transport,
        config: DialogConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            conversation: Arc::new(conversation),
            transport: Arc::new(transport),
            persistence: None,
            config,
            token,
        }
    }

    /// Hands sessions to `persistence` at dialog creation and termination.
    #[must_use]
    pub fn with_persistence(mut self, persistence: impl Persistence<S>) -> Self {
        self.persistence = Some(Arc::new(persistence));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &DialogConfig {
        &self.config
    }

    /// Routes `event` to the dialog registered for `identity`, creating one if absent.
    ///
    /// Waits while the dialog's queue is full. Events for one identity keep their order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Stopped` once the cancellation signal has fired.
    pub async fn route(&self, identity: Identity, event: Event) -> Result<(), Error> {
        let mut event = event;
        loop {
            if self.token.is_cancelled() {
                return Err(Error::Stopped);
            }
            let sender = {
                let mut dialogs = self.registry.dialogs.lock().await;
                let live = dialogs
                    .get(&identity)
                    .filter(|entry| !entry.sender.is_closed())
                    .map(|entry| entry.sender.clone());
                match live {
                    Some(sender) => sender,
                    None => self.spawn(&mut dialogs, identity.clone(), 0),
                }
            };
            match sender.send(event).await {
                Ok(()) => return Ok(()),
                Err(SendError(returned)) => {
                    debug!("Dialog {} closed while routing, retrying.", identity);
                    event = returned;
                }
            }
        }
    }

    /// Routes an event to the dialog of its own chat and user under `bot`.
    pub async fn dispatch(&self, bot: &str, event: Event) -> Result<(), Error> {
        self.route(Identity::of(bot, &event), event).await
    }

    /// Ends registration `id` of `identity` and hands its queued events over, in order.
    ///
    /// Everything runs under the registry lock. The old queue is closed and drained to the end:
    /// sends that got a permit before the close still land, later ones fail and their routers
    /// retry behind this lock. With `exit` allowing it, a successor dialog is registered with the
    /// leftovers already queued, so no newer event can overtake them.
    ///
    /// Returns the number of events dropped.
    pub(crate) async fn handoff(
        &self,
        identity: &Identity,
        id: u64,
        receiver: &mut mpsc::Receiver<Event>,
        exit: Exit,
    ) -> usize {
        let mut dialogs = self.registry.dialogs.lock().await;
        if dialogs.get(identity).is_some_and(|entry| entry.id == id) {
            dialogs.remove(identity);
        }
        receiver.close();
        let mut pending = Vec::new();
        while let Some(event) = receiver.recv().await {
            pending.push(event);
        }

        let reroute = exit.reroutes_pending() && !self.token.is_cancelled();
        self.registry.publish(DialogEvent::Terminated {
            identity: identity.clone(),
            exit,
        });
        if pending.is_empty() {
            return 0;
        }
        if !reroute {
            return pending.len();
        }

        debug!(
            "Handing {} queued events of dialog {} to a new dialog.",
            pending.len(),
            identity
        );
        let live = dialogs
            .get(identity)
            .filter(|entry| !entry.sender.is_closed())
            .map(|entry| entry.sender.clone());
        let sender = match live {
            Some(sender) => sender,
            None => self.spawn(&mut dialogs, identity.clone(), pending.len()),
        };
        pending
            .into_iter()
            .map(|event| sender.try_send(event))
            .filter(Result::is_err)
            .count()
    }

    /// Registers a new dialog and starts its task. Must be called with the registry locked.
    ///
    /// The queue holds at least `reserve` events.
    fn spawn(
        &self,
        dialogs: &mut HashMap<Identity, Entry>,
        identity: Identity,
        reserve: usize,
    ) -> mpsc::Sender<Event> {
        let (sender, receiver) = mpsc::channel(self.config.capacity().max(reserve));
        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst);
        if dialogs
            .insert(
                identity.clone(),
                Entry {
                    id,
                    sender: sender.clone(),
                },
            )
            .is_some()
        {
            warn!("Replacing closed dialog entry for {}.", identity);
        }
        debug!("Run new dialog task: {}", identity);

        let dialog = Dialog::new(
            identity.clone(),
            receiver,
            self.transport.clone(),
            self.config.send_interval(),
            self.config.inactive_timeout(),
            self.token.clone(),
        );
        let runner = DialogRunner::new(
            id,
            dialog,
            self.conversation.clone(),
            self.persistence.clone(),
            self.clone(),
        );
        self.registry.publish(DialogEvent::Started { identity });
        tokio::spawn(runner.init());
        sender
    }

    /// Fires the cancellation signal: waiting dialogs terminate and routing stops.
    pub fn stop(&self) {
        debug!("Stopping dialog router...");
        self.token.cancel();
    }

    /// Runs a sink over this router's lifecycle notifications in a separate task.
    pub fn run_sink(&self, mut sink: Sink) {
        tokio::spawn(async move {
            sink.run().await;
        });
    }
}
