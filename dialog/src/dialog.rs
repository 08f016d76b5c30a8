// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dialog handle
//!
//! A `Dialog` is the conversation handler's view of its actor: it reads the inbound queue that
//! only the router writes to, and sends output through the dialog's own rate limiter.
//!
//! Waiting for the next event races three sources: the queue, the inactivity deadline and the
//! process-wide cancellation token. The wait never unwinds; it returns a [`Wait`] tag and the
//! convenience readers turn the non-event tags into errors so handlers can use `?`.
//!

use crate::{
    Error, Event, Identity,
    limiter::RateLimiter,
    transport::{MediaItem, Outgoing, Transport, album},
};

use async_trait::async_trait;
use tokio::{select, sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use std::{sync::Arc, time::Duration};

/// Lifecycle of a dialog actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogLifecycle {
    /// Identity assigned, queue allocated, registered.
    Created,
    /// Executing handler logic.
    Running,
    /// Blocked on the next event, the deadline or cancellation.
    AwaitingEvent,
    /// The inactivity deadline elapsed.
    TimedOut,
    /// The cancellation signal fired.
    Cancelled,
    /// Finalized and deregistered.
    Terminated,
}

/// Outcome of waiting for the next event.
#[derive(Debug, Clone, PartialEq)]
pub enum Wait {
    Event(Event),
    TimedOut,
    Cancelled,
}

/// Conversation logic run by each dialog.
///
/// `run` is invoked once per dialog, right after its session is loaded, and drives the whole
/// conversation by pulling events from the dialog. Returning ends the dialog.
#[async_trait]
pub trait Conversation<S>: Send + Sync + 'static {
    async fn run(&self, dialog: &mut Dialog, session: &mut S) -> Result<(), Error>;
}

/// Actor-side handle of one conversation.
pub struct Dialog {
    identity: Identity,
    receiver: mpsc::Receiver<Event>,
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    inactive_timeout: Duration,
    token: CancellationToken,
    lifecycle: DialogLifecycle,
}

impl Dialog {
    pub(crate) fn new(
        identity: Identity,
        receiver: mpsc::Receiver<Event>,
        transport: Arc<dyn Transport>,
        send_interval: Duration,
        inactive_timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        debug!("Creating new dialog {}.", identity);
        Self {
            identity,
            receiver,
            transport,
            limiter: RateLimiter::new(send_interval),
            inactive_timeout,
            token,
            lifecycle: DialogLifecycle::Created,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn chat_id(&self) -> i64 {
        self.identity.chat_id()
    }

    pub fn user_id(&self) -> i64 {
        self.identity.user_id()
    }

    pub fn inactive_timeout(&self) -> Duration {
        self.inactive_timeout
    }

    pub fn lifecycle(&self) -> DialogLifecycle {
        self.lifecycle
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: DialogLifecycle) {
        self.lifecycle = lifecycle;
    }

    pub(crate) fn receiver_mut(&mut self) -> &mut mpsc::Receiver<Event> {
        &mut self.receiver
    }

    /// Waits for the next event, the inactivity deadline or cancellation, whichever comes first.
    pub async fn next_event(&mut self) -> Wait {
        self.lifecycle = DialogLifecycle::AwaitingEvent;
        let wait = select! {
            biased;
            _ = self.token.cancelled() => Wait::Cancelled,
            event = self.receiver.recv() => match event {
                Some(event) => Wait::Event(event),
                // Every sender is gone: the router itself was dropped.
                None => Wait::Cancelled,
            },
            _ = sleep(self.inactive_timeout) => Wait::TimedOut,
        };
        self.lifecycle = match wait {
            Wait::Event(_) => DialogLifecycle::Running,
            Wait::TimedOut => {
                debug!("Dialog {} reached its inactivity timeout.", self.identity);
                DialogLifecycle::TimedOut
            }
            Wait::Cancelled => DialogLifecycle::Cancelled,
        };
        wait
    }

    /// Next event, or `DialogTimeout`/`Cancelled` as an error.
    pub async fn event(&mut self) -> Result<Event, Error> {
        match self.next_event().await {
            Wait::Event(event) => Ok(event),
            Wait::TimedOut => Err(Error::DialogTimeout),
            Wait::Cancelled => Err(Error::Cancelled),
        }
    }

    /// Text of the next event.
    pub async fn text(&mut self) -> Result<String, Error> {
        self.event().await.map(|event| event.text)
    }

    pub async fn send_text(&mut self, text: &str) -> Result<(), Error> {
        self.send(Outgoing::Text(text.to_owned())).await
    }

    pub async fn send_html(&mut self, html: &str) -> Result<(), Error> {
        self.send(Outgoing::Html(html.to_owned())).await
    }

    /// Sends named blobs as one album, with the caption on the first item.
    pub async fn send_album(
        &mut self,
        caption: &str,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<(), Error> {
        self.send_batch(album(caption, files)).await
    }

    pub async fn send(&mut self, message: Outgoing) -> Result<(), Error> {
        self.limiter.before_send().await;
        let result = self.transport.send(self.chat_id(), message).await;
        self.limiter.after_send();
        result
    }

    pub async fn send_batch(&mut self, items: Vec<MediaItem>) -> Result<(), Error> {
        self.limiter.before_send().await;
        let result = self.transport.send_batch(self.chat_id(), items).await;
        self.limiter.after_send();
        result
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use tokio::{sync::Mutex, time::Instant};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(Instant, i64, String)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, chat_id: i64, message: Outgoing) -> Result<(), Error> {
            self.sent
                .lock()
                .await
                .push((Instant::now(), chat_id, message.body().to_owned()));
            Ok(())
        }

        async fn send_batch(
            &self,
            chat_id: i64,
            items: Vec<MediaItem>,
        ) -> Result<(), Error> {
            self.sent.lock().await.push((
                Instant::now(),
                chat_id,
                format!("album:{}", items.len()),
            ));
            Ok(())
        }
    }

    fn dialog(
        transport: Arc<RecordingTransport>,
        token: CancellationToken,
    ) -> (mpsc::Sender<Event>, Dialog) {
        let (sender, receiver) = mpsc::channel(8);
        let dialog = Dialog::new(
            Identity::new("bot", 5, 6),
            receiver,
            transport,
            Duration::from_millis(100),
            Duration::from_secs(30),
            token,
        );
        (sender, dialog)
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_event_in_order() {
        let transport = Arc::new(RecordingTransport::default());
        let (sender, mut dialog) = dialog(transport, CancellationToken::new());
        sender.send(Event::new(5, 6, "first")).await.unwrap();
        sender.send(Event::new(5, 6, "second")).await.unwrap();
        assert_eq!(dialog.text().await.unwrap(), "first");
        assert_eq!(dialog.lifecycle(), DialogLifecycle::Running);
        assert_eq!(dialog.text().await.unwrap(), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_event_times_out() {
        let transport = Arc::new(RecordingTransport::default());
        let (_sender, mut dialog) = dialog(transport, CancellationToken::new());
        let start = Instant::now();
        assert_eq!(dialog.next_event().await, Wait::TimedOut);
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert_eq!(dialog.lifecycle(), DialogLifecycle::TimedOut);
        assert_eq!(dialog.event().await, Err(Error::DialogTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_event_cancelled() {
        let transport = Arc::new(RecordingTransport::default());
        let token = CancellationToken::new();
        let (_sender, mut dialog) = dialog(transport, token.clone());
        token.cancel();
        assert_eq!(dialog.next_event().await, Wait::Cancelled);
        assert_eq!(dialog.lifecycle(), DialogLifecycle::Cancelled);
        assert_eq!(dialog.text().await, Err(Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_are_rate_limited() {
        let transport = Arc::new(RecordingTransport::default());
        let (_sender, mut dialog) =
            dialog(transport.clone(), CancellationToken::new());
        dialog.send_text("one").await.unwrap();
        dialog.send_html("<b>two</b>").await.unwrap();
        dialog
            .send_album("three", vec![("a.png".to_owned(), vec![0])])
            .await
            .unwrap();

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].1, 5);
        assert_eq!(sent[1].2, "<b>two</b>");
        assert_eq!(sent[2].2, "album:1");
        for pair in sent.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(100));
        }
    }
}
