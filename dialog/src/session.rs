// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Session state
//!
//! A dialog owns one session value for its whole life. The runtime never looks inside it: it only
//! needs to create a fresh one, encode it, decode it and fingerprint it. Whether a final session
//! is worth writing back is decided by the [`Persistence`] collaborator.
//!

use crate::{Error, Identity};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use std::fmt::{Formatter, Write};

/// Content fingerprint of an encoded session.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of raw bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut hex = String::with_capacity(64);
        for byte in self.0 {
            let _ = write!(hex, "{:02x}", byte);
        }
        f.write_str(&hex)
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// Capabilities the runtime needs from an application session type.
pub trait Session: Send + Sync + Sized + 'static {
    /// Session for an identity that has nothing stored yet.
    fn fresh(identity: &Identity) -> Self;

    /// Serialize the session.
    fn encode(&self) -> Result<Vec<u8>, Error>;

    /// Rebuild a session from stored bytes.
    fn decode(identity: &Identity, bytes: &[u8]) -> Result<Self, Error>;

    /// Fingerprint used for change detection.
    fn fingerprint(&self) -> Result<Fingerprint, Error> {
        Ok(Fingerprint::of(&self.encode()?))
    }
}

/// Persistence collaborator.
///
/// `load` is called once when a dialog is created and `store` once when it terminates. The
/// runtime always offers the final session; the implementation decides whether a write is
/// needed and returns `true` when it wrote.
#[async_trait]
pub trait Persistence<S: Session>: Send + Sync + 'static {
    async fn load(&self, identity: &Identity) -> Result<S, Error>;

    async fn store(&self, identity: &Identity, session: &S) -> Result<bool, Error>;
}

#[cfg(test)]
mod tests {

    use super::*;

    struct Counter(u32);

    impl Session for Counter {
        fn fresh(_identity: &Identity) -> Self {
            Counter(0)
        }

        fn encode(&self) -> Result<Vec<u8>, Error> {
            Ok(self.0.to_be_bytes().to_vec())
        }

        fn decode(_identity: &Identity, bytes: &[u8]) -> Result<Self, Error> {
            let raw: [u8; 4] = bytes
                .try_into()
                .map_err(|_| Error::Decode("bad length".to_owned()))?;
            Ok(Counter(u32::from_be_bytes(raw)))
        }
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let identity = Identity::new("bot", 1, 1);
        let mut session = Counter::fresh(&identity);
        let before = session.fingerprint().unwrap();
        assert_eq!(before, Counter(0).fingerprint().unwrap());
        session.0 += 1;
        assert_ne!(before, session.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_display() {
        let fingerprint = Fingerprint::of(b"");
        assert_eq!(
            fingerprint.to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_decode_error() {
        let identity = Identity::new("bot", 1, 1);
        assert!(Counter::decode(&identity, b"abc").is_err());
        let session = Counter::decode(&identity, &7u32.to_be_bytes()).unwrap();
        assert_eq!(session.0, 7);
    }
}
