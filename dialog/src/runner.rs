// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dialog runner
//!
//! Each dialog executes inside its own `DialogRunner` task. The runner walks the dialog through
//! its lifecycle:
//!
//! ```text
//! Created ─load─> Running ─handler─> {TimedOut | Cancelled} ─> Terminated
//!    │                 │                                           ∧
//!    └── load failed ──┴────────── finished / faulted ────────────┘
//! ```
//!
//! `Terminated` is the finalizer and is reached on every path: a panic inside the handler or the
//! persistence collaborator is caught at the runner boundary and logged, the final session is
//! offered to the persistence collaborator, and the dialog deregisters. Events that were still
//! queued are handed to a successor dialog under the registry lock, ahead of anything newer.
//!

use crate::{
    Error,
    dialog::{Conversation, Dialog, DialogLifecycle},
    registry::Router,
    session::{Persistence, Session},
    sink::Exit,
};

use futures::FutureExt;
use tracing::{debug, error, warn};

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

/// Runtime of one dialog.
pub(crate) struct DialogRunner<S: Session> {
    /// Registration id in the registry.
    id: u64,
    /// The dialog handle given to the conversation.
    dialog: Dialog,
    /// Conversation logic.
    conversation: Arc<dyn Conversation<S>>,
    /// Optional persistence collaborator.
    persistence: Option<Arc<dyn Persistence<S>>>,
    /// Router used to deregister and to hand leftover events over.
    router: Router<S>,
}

impl<S: Session> DialogRunner<S> {
    pub(crate) fn new(
        id: u64,
        dialog: Dialog,
        conversation: Arc<dyn Conversation<S>>,
        persistence: Option<Arc<dyn Persistence<S>>>,
        router: Router<S>,
    ) -> Self {
        debug!("Creating new dialog runner.");
        Self {
            id,
            dialog,
            conversation,
            persistence,
            router,
        }
    }

    /// Drives the dialog from creation to termination.
    pub(crate) async fn init(mut self) {
        let identity = self.dialog.identity().clone();
        debug!("Initializing dialog {} runner.", identity);

        let mut session: Option<S> = None;
        let mut exit = Exit::Finished;
        loop {
            match self.dialog.lifecycle() {
                // State: CREATED
                DialogLifecycle::Created => {
                    debug!("Dialog {} is created.", identity);
                    match AssertUnwindSafe(self.load()).catch_unwind().await {
                        Ok(Ok(loaded)) => {
                            session = Some(loaded);
                            self.dialog.set_lifecycle(DialogLifecycle::Running);
                        }
                        Ok(Err(err)) => {
                            error!("Dialog {} failed to load its session: {}", identity, err);
                            exit = Exit::LoadFailed(err.to_string());
                            self.dialog.set_lifecycle(DialogLifecycle::Terminated);
                        }
                        Err(panic) => {
                            let reason = panic_reason(panic.as_ref());
                            error!("Recovered failed load of dialog {}: {}", identity, reason);
                            exit = Exit::LoadFailed(reason);
                            self.dialog.set_lifecycle(DialogLifecycle::Terminated);
                        }
                    }
                }
                // State: RUNNING
                DialogLifecycle::Running | DialogLifecycle::AwaitingEvent => {
                    exit = match session.as_mut() {
                        Some(session) => self.run(session).await,
                        None => Exit::Faulted("missing session".to_owned()),
                    };
                    let next = match exit {
                        Exit::TimedOut => DialogLifecycle::TimedOut,
                        Exit::Cancelled => DialogLifecycle::Cancelled,
                        _ => DialogLifecycle::Terminated,
                    };
                    self.dialog.set_lifecycle(next);
                }
                // State: TIMED OUT
                DialogLifecycle::TimedOut => {
                    debug!("Dialog {} timed out.", identity);
                    self.dialog.set_lifecycle(DialogLifecycle::Terminated);
                }
                // State: CANCELLED
                DialogLifecycle::Cancelled => {
                    debug!("Dialog {} is cancelled.", identity);
                    self.dialog.set_lifecycle(DialogLifecycle::Terminated);
                }
                // State: TERMINATED
                DialogLifecycle::Terminated => {
                    self.terminate(session.take(), exit).await;
                    break;
                }
            }
        }
    }

    /// Loads the session, or creates a fresh one when no persistence is configured.
    async fn load(&self) -> Result<S, Error> {
        match &self.persistence {
            Some(persistence) => persistence.load(self.dialog.identity()).await,
            None => Ok(S::fresh(self.dialog.identity())),
        }
    }

    /// Runs the conversation handler, converting every way out of it into an `Exit`.
    async fn run(&mut self, session: &mut S) -> Exit {
        debug!("Running dialog {}.", self.dialog.identity());
        let conversation = self.conversation.clone();
        let result = AssertUnwindSafe(conversation.run(&mut self.dialog, session))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(())) => Exit::Finished,
            Ok(Err(Error::DialogTimeout)) => Exit::TimedOut,
            Ok(Err(Error::Cancelled)) => Exit::Cancelled,
            Ok(Err(err)) => {
                error!("Dialog {} failed: {}", self.dialog.identity(), err);
                Exit::Faulted(err.to_string())
            }
            Err(panic) => {
                let reason = panic_reason(panic.as_ref());
                error!(
                    "Recovered failed dialog {}: {}",
                    self.dialog.identity(),
                    reason
                );
                Exit::Faulted(reason)
            }
        }
    }

    /// Finalizer: store, then hand queued events over while deregistering.
    async fn terminate(&mut self, session: Option<S>, exit: Exit) {
        let identity = self.dialog.identity().clone();
        debug!("Dialog {} is terminated ({:?}).", identity, exit);

        // Store before the handoff. A successor must load the stored session; events arriving
        // meanwhile stay queued here.
        if let (Some(persistence), Some(session)) = (&self.persistence, &session) {
            let stored = AssertUnwindSafe(persistence.store(&identity, session))
                .catch_unwind()
                .await;
            match stored {
                Ok(Ok(true)) => debug!("Session of dialog {} stored.", identity),
                Ok(Ok(false)) => debug!("Session of dialog {} unchanged.", identity),
                Ok(Err(err)) => {
                    error!("Error while writing session of {}: {}", identity, err)
                }
                Err(panic) => error!(
                    "Recovered failed store of dialog {}: {}",
                    identity,
                    panic_reason(panic.as_ref())
                ),
            }
        }

        let dropped = self
            .router
            .handoff(&identity, self.id, self.dialog.receiver_mut(), exit)
            .await;
        if dropped > 0 {
            warn!(
                "Dropping {} undelivered events of dialog {}.",
                dropped, identity
            );
        }
        debug!("Finished dialog {}.", identity);
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        (*reason).to_owned()
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_owned()
    }
}
