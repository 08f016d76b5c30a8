// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Session store
//!
//! `SessionStore` is the persistence collaborator of the dialog runtime. It loads a session when
//! a dialog is created and remembers the session's fingerprint; when the dialog terminates the
//! final session is written only if its fingerprint differs from the one captured at load.
//!
//! Stored values can be encrypted with ChaCha20-Poly1305. The password is kept in an
//! `EncryptedMem` box and only decrypted for the duration of one operation. Each value carries
//! its own random nonce as a 12-byte prefix.
//!

use crate::{backend::Backend, error::Error};

use dialog::{
    Error as DialogError, Fingerprint, Identity, Persistence, Session,
};

use async_trait::async_trait;
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use memsecurity::EncryptedMem;
use tracing::{debug, error, warn};

use std::{
    collections::HashMap,
    sync::Mutex,
};

/// Nonce size.
const NONCE_SIZE: usize = 12;

/// Persistence collaborator over a [`Backend`].
pub struct SessionStore<B: Backend> {
    /// Where encoded sessions live.
    backend: B,
    /// Fingerprints captured at load, per live dialog.
    loaded: Mutex<HashMap<Identity, Fingerprint>>,
    /// Key box that encrypts contents.
    key_box: Option<EncryptedMem>,
}

impl<B: Backend> SessionStore<B> {
    /// Creates a store writing plain encoded sessions.
    pub fn new(backend: B) -> Self {
        debug!("Creating session store over {} backend.", backend.name());
        Self {
            backend,
            loaded: Mutex::new(HashMap::new()),
            key_box: None,
        }
    }

    /// Encrypts every stored session with `password`.
    pub fn with_password(mut self, password: [u8; 32]) -> Result<Self, Error> {
        let mut key_box = EncryptedMem::new();
        key_box
            .encrypt(&password)
            .map_err(|_| Error::Store("Can't encrypt password.".to_owned()))?;
        self.key_box = Some(key_box);
        Ok(self)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Reads and decodes the session of `identity`.
    ///
    /// A missing entry yields a fresh session. An entry that can not be decrypted or decoded is
    /// logged and replaced by a fresh session as well.
    pub async fn read<S: Session>(&self, identity: &Identity) -> Result<S, Error> {
        let key = identity.key();
        let data = match self.backend.get(&key).await {
            Ok(data) => data,
            Err(Error::EntryNotFound(_)) => {
                debug!("No stored session for {}.", identity);
                return Ok(S::fresh(identity));
            }
            Err(e) => return Err(e),
        };
        let session = self
            .open(&data)
            .and_then(|bytes| {
                S::decode(identity, &bytes)
                    .map_err(|e| Error::Get(e.to_string()))
            });
        match session {
            Ok(session) => Ok(session),
            Err(e) => {
                warn!("Wrong stored session for {}: {}", identity, e);
                Ok(S::fresh(identity))
            }
        }
    }

    /// Encodes and writes `session` unconditionally.
    pub async fn write<S: Session>(
        &self,
        identity: &Identity,
        session: &S,
    ) -> Result<(), Error> {
        let bytes = session.encode().map_err(|e| {
            error!("Can't encode session of {}: {}", identity, e);
            Error::Store(e.to_string())
        })?;
        let data = self.seal(&bytes)?;
        self.backend.put(&identity.key(), &data).await
    }

    fn remember(&self, identity: &Identity, fingerprint: Fingerprint) -> Result<(), Error> {
        let mut loaded = self
            .loaded
            .lock()
            .map_err(|e| Error::Store(format!("Can not lock fingerprints: {}", e)))?;
        loaded.insert(identity.clone(), fingerprint);
        Ok(())
    }

    fn forget(&self, identity: &Identity) -> Result<Option<Fingerprint>, Error> {
        let mut loaded = self
            .loaded
            .lock()
            .map_err(|e| Error::Store(format!("Can not lock fingerprints: {}", e)))?;
        Ok(loaded.remove(identity))
    }

    /// Encrypts bytes when a password is configured.
    fn seal(&self, bytes: &[u8]) -> Result<Vec<u8>, Error> {
        match &self.key_box {
            Some(key_box) => {
                let key = key_box
                    .decrypt()
                    .map_err(|_| Error::Store("Can't decrypt key".to_owned()))?;
                encrypt(key.as_ref(), bytes)
            }
            None => Ok(bytes.to_vec()),
        }
    }

    /// Decrypts bytes when a password is configured.
    fn open(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        match &self.key_box {
            Some(key_box) => {
                let key = key_box
                    .decrypt()
                    .map_err(|_| Error::Get("Can't decrypt key".to_owned()))?;
                decrypt(key.as_ref(), data)
            }
            None => Ok(data.to_vec()),
        }
    }
}

#[async_trait]
impl<S: Session, B: Backend> Persistence<S> for SessionStore<B> {
    async fn load(&self, identity: &Identity) -> Result<S, DialogError> {
        let session: S = self.read(identity).await.map_err(Error::into_load)?;
        let fingerprint = session.fingerprint()?;
        self.remember(identity, fingerprint)
            .map_err(Error::into_load)?;
        debug!("Loaded session of {} ({}).", identity, fingerprint);
        Ok(session)
    }

    async fn store(&self, identity: &Identity, session: &S) -> Result<bool, DialogError> {
        let loaded = self.forget(identity).map_err(Error::into_store)?;
        let fingerprint = session.fingerprint()?;
        if loaded == Some(fingerprint) {
            debug!("Session of {} unchanged, skipping write.", identity);
            return Ok(false);
        }
        self.write(identity, session)
            .await
            .map_err(Error::into_store)?;
        Ok(true)
    }
}

/// Encrypt bytes.
fn encrypt(key: &[u8], bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext: Vec<u8> = cipher
        .encrypt(&nonce, bytes)
        .map_err(|e| Error::Store(format!("Encrypt error: {}", e)))?;

    Ok([nonce.to_vec(), ciphertext].concat())
}

/// Decrypt bytes.
fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    if ciphertext.len() < NONCE_SIZE {
        return Err(Error::Get("Ciphertext too short".to_owned()));
    }
    let cipher = ChaCha20Poly1305::new(key.into());
    let (nonce, ciphertext) = ciphertext.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| Error::Get(format!("Decrypt error: {}", e)))?;
    Ok(plaintext)
}
