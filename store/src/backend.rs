// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Storage backends
//!
//! A [`Backend`] keeps opaque byte values under string keys. Session keys come from
//! `Identity::key`, one value per conversation. Values are already encoded (and possibly
//! encrypted) when they reach the backend.
//!

use crate::error::Error;

use async_trait::async_trait;

/// Key-value storage of encoded sessions.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Value stored under `key`.
    ///
    /// # Errors
    ///
    /// `Error::EntryNotFound` when nothing is stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, Error>;

    /// Stores `data` under `key`, replacing any previous value.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), Error>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// `Error::EntryNotFound` when nothing is stored under `key`.
    async fn del(&self, key: &str) -> Result<(), Error>;
}

#[macro_export]
macro_rules! test_backend_trait {
    ($name:ident: $backend:expr) => {
        #[cfg(test)]
        mod $name {
            use super::*;
            use $crate::{backend::Backend, error::Error};

            #[tokio::test]
            async fn test_put_get() {
                let backend = $backend;
                backend.put("key", b"value").await.unwrap();
                assert_eq!(backend.get("key").await.unwrap(), b"value");
            }

            #[tokio::test]
            async fn test_put_replaces() {
                let backend = $backend;
                backend.put("key", b"first").await.unwrap();
                backend.put("key", b"second").await.unwrap();
                assert_eq!(backend.get("key").await.unwrap(), b"second");
            }

            #[tokio::test]
            async fn test_get_missing() {
                let backend = $backend;
                assert!(matches!(
                    backend.get("missing").await,
                    Err(Error::EntryNotFound(_))
                ));
            }

            #[tokio::test]
            async fn test_del() {
                let backend = $backend;
                backend.put("key", b"value").await.unwrap();
                backend.del("key").await.unwrap();
                assert!(matches!(
                    backend.get("key").await,
                    Err(Error::EntryNotFound(_))
                ));
                assert!(matches!(
                    backend.del("key").await,
                    Err(Error::EntryNotFound(_))
                ));
            }

            #[tokio::test]
            async fn test_keys_are_independent() {
                let backend = $backend;
                backend.put("bot-a.chat-1.user-1", b"a").await.unwrap();
                backend.put("bot-a.chat-1.user-2", b"b").await.unwrap();
                assert_eq!(
                    backend.get("bot-a.chat-1.user-1").await.unwrap(),
                    b"a"
                );
                assert_eq!(
                    backend.get("bot-a.chat-1.user-2").await.unwrap(),
                    b"b"
                );
            }
        }
    };
}
