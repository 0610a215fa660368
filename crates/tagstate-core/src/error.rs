//! Error taxonomy for the tag-state stores.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing file is absent. Loads recover from this locally; only the
    /// management read paths report it.
    #[error("document not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// Backing file exists but does not parse as the expected document.
    #[error("document {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// The OS refused an advisory lock on the lock file.
    #[error("advisory lock unavailable on {}: {source}", .path.display())]
    LockUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A mutation payload was rejected before anything was written.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation(message.into())
    }

    /// True for failures a read path is allowed to paper over with defaults.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::NotFound { .. } | StoreError::Corrupt { .. })
    }
}
