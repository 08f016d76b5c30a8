// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! File backend implementation.
//!
//! One file per key inside a directory. Writes go to `<key>.inprogress` first and are renamed
//! over the final name, so a crash mid-write never leaves a truncated session behind.
//!

use crate::{backend::Backend, error::Error};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, error};

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Suffix of files being written.
const IN_PROGRESS: &str = "inprogress";

/// A backend that stores each session in its own file.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens a backend over `dir`, creating the directory when missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::CreateStore(format!(
                "Can not create directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, Error> {
        if key.is_empty()
            || key.contains(['/', '\\'])
            || key.starts_with('.')
        {
            return Err(Error::Store(format!("Invalid key: {}", key)));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        let path = self.path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::EntryNotFound(key.to_owned()))
            }
            Err(e) => Err(Error::Get(format!(
                "Can not read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<(), Error> {
        let path = self.path(key)?;
        let progress = self.dir.join(format!("{}.{}", key, IN_PROGRESS));
        fs::write(&progress, data).await.map_err(|e| {
            error!("Can not write {}: {}", progress.display(), e);
            Error::Store(format!("Can not write {}: {}", progress.display(), e))
        })?;
        fs::rename(&progress, &path).await.map_err(|e| {
            error!("Can not rename {}: {}", progress.display(), e);
            Error::Store(format!(
                "Can not rename {} to {}: {}",
                progress.display(),
                path.display(),
                e
            ))
        })?;
        debug!("Stored {} bytes to {}.", data.len(), path.display());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), Error> {
        let path = self.path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::EntryNotFound(key.to_owned()))
            }
            Err(e) => Err(Error::Store(format!(
                "Can not remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
