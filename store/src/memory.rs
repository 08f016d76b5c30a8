// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Memory backend implementation.
//!

use crate::{backend::Backend, error::Error};

use async_trait::async_trait;

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

/// A backend that keeps sessions in memory. Clones share the same data.
#[derive(Default, Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Number of stored entries.
    pub fn len(&self) -> Result<usize, Error> {
        let lock = self
            .data
            .read()
            .map_err(|e| Error::Get(format!("Can not lock data: {}", e)))?;
        Ok(lock.len())
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        let lock = self
            .data
            .read()
            .map_err(|e| Error::Get(format!("Can not lock data: {}", e)))?;

        match lock.get(key) {
            Some(value) => Ok(value.clone()),
            None => Err(Error::EntryNotFound(key.to_owned())),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<(), Error> {
        let mut lock = self
            .data
            .write()
            .map_err(|e| Error::Store(format!("Can not lock data: {}", e)))?;
        lock.insert(key.to_owned(), data.to_vec());

        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), Error> {
        let mut lock = self
            .data
            .write()
            .map_err(|e| Error::Store(format!("Can not lock data: {}", e)))?;
        match lock.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::EntryNotFound(key.to_owned())),
        }
    }
}
