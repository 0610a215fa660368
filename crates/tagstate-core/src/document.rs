//! A single JSON document on disk with locked read-modify-write.
//!
//! [`JsonDocument::update`] is the only way a document changes: under the
//! document's [`ExclusiveLock`] it reads the current bytes, hands the parsed
//! value to a mutator, and commits the result with a temp-file rename. A
//! mutator error aborts before anything is staged, so the file keeps its
//! previous contents.
//!
//! Reads recover locally: a missing or empty file is the default document,
//! and an unparseable one is the default document plus a warning. Before the
//! first write over an unparseable file its bytes are copied to `.bak`.

use crate::error::{Result, StoreError};
use crate::lock::{ExclusiveLock, LockMode, LockPreference};
use crate::safe_io::{StagedWrite, preserve_corrupt};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A root type stored by [`JsonDocument`].
pub trait Document: Serialize + Default {
    /// Human-readable name used in diagnostics.
    const KIND: &'static str;

    /// Lenient conversion from stored JSON. An `Err` means the root has the
    /// wrong shape and the file is treated as corrupt.
    fn from_value(value: Value) -> std::result::Result<Self, String>;
}

enum Stored<D> {
    Missing,
    Parsed(D),
    Corrupt(String),
}

pub struct JsonDocument<D> {
    path: PathBuf,
    lock: ExclusiveLock,
    backup_corrupt: bool,
    _doc: PhantomData<fn() -> D>,
}

impl<D: Document> JsonDocument<D> {
    pub fn open(path: &Path, lock: LockPreference, backup_corrupt: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: ExclusiveLock::new(path, lock),
            backup_corrupt,
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_mode(&self) -> LockMode {
        self.lock.mode()
    }

    fn read_bytes(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                Err(self.corrupt(format!("not valid UTF-8: {e}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }

    fn read(&self) -> Result<Stored<D>> {
        let raw = match self.read_bytes() {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(Stored::Missing),
            Err(StoreError::Corrupt { reason, .. }) => return Ok(Stored::Corrupt(reason)),
            Err(e) => return Err(e),
        };
        if raw.trim().is_empty() {
            return Ok(Stored::Parsed(D::default()));
        }
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => return Ok(Stored::Corrupt(e.to_string())),
        };
        Ok(match D::from_value(value) {
            Ok(doc) => Stored::Parsed(doc),
            Err(reason) => Stored::Corrupt(reason),
        })
    }

    /// Current document without taking the lock. Missing and corrupt files
    /// read as the default document.
    pub fn load(&self) -> Result<D> {
        match self.read()? {
            Stored::Parsed(doc) => Ok(doc),
            Stored::Missing => Ok(D::default()),
            Stored::Corrupt(reason) => {
                log::warn!(
                    "{}; reading it as an empty {}",
                    self.corrupt(reason),
                    D::KIND
                );
                Ok(D::default())
            }
        }
    }

    /// The stored JSON exactly as on disk. Unlike [`load`](Self::load) this
    /// reports missing and unparseable files.
    pub fn read_value(&self) -> Result<Value> {
        let raw = self.read_bytes()?.ok_or_else(|| StoreError::NotFound {
            path: self.path.clone(),
        })?;
        serde_json::from_str(&raw).map_err(|e| self.corrupt(e.to_string()))
    }

    /// Locked read-modify-write.
    ///
    /// `mutator` sees the current document (default if missing or corrupt).
    /// If it returns `Ok`, the document is written atomically and its value
    /// is returned; if it returns `Err`, nothing is written.
    pub fn update<R>(&self, mutator: impl FnOnce(&mut D) -> Result<R>) -> Result<R> {
        let _guard = self.lock.acquire()?;

        let mut doc = match self.read()? {
            Stored::Parsed(doc) => doc,
            Stored::Missing => D::default(),
            Stored::Corrupt(reason) => {
                let err = self.corrupt(reason);
                if self.backup_corrupt {
                    let backup = preserve_corrupt(&self.path)?;
                    log::warn!(
                        "{err}; preserved as {} and starting from an empty {}",
                        backup.display(),
                        D::KIND
                    );
                } else {
                    log::warn!("{err}; overwriting with an empty {}", D::KIND);
                }
                D::default()
            }
        };

        let out = mutator(&mut doc)?;

        StagedWrite::json(&self.path, &doc)?.commit()?;
        log::debug!("committed {} to {}", D::KIND, self.path.display());

        Ok(out)
    }
}
