// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Chat bot runtime for long-running image generation.
//! Every conversation runs in its own actor with a private event queue, session and rate limiter;
//! generation work is fanned out over a tiered worker pool against a remote submit/poll API.
//! Sessions are persisted through pluggable backends, optionally encrypted.
//! The `cover` module is a complete conversation built on these pieces.

pub mod cover;

pub use dialog::{
    Conversation, Dialog, DialogConfig, DialogEvent, DialogLifecycle,
    Error as DialogError, Event, Exit, Fingerprint, Identity, MediaItem,
    Outgoing, Persistence, RateLimiter, Registry, Router, Session, Sink,
    Subscriber, Transport, Wait,
};

pub use generation::{
    Credentials, Error as GenerationError, FixedInterval, GenerationClient,
    GenerationConfig, GenerationOutcome, GenerationRequest, ImageSource,
    JitterInterval, NoInterval, Orchestrator, PollStrategy,
};

pub use store::{
    Backend, Error as StoreError, FileBackend, MemoryBackend, SessionStore,
};
