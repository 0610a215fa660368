//! Configuration and home directory resolution.
//!
//! Everything lives under one home directory:
//!
//! ```text
//! <home>/config.toml        optional, see [`Config`]
//! <home>/user_status.json   per-user tag state
//! <home>/tags.json          tag catalog
//! ```

use crate::error::{Result, StoreError};
use crate::lock::LockPreference;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "TAGSTATE_HOME";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// User-status document, relative to the home directory unless absolute.
    pub user_status_file: PathBuf,
    /// Tag catalog, relative to the home directory unless absolute.
    pub tags_file: PathBuf,
    pub lock_mode: LockPreference,
    /// Copy unreadable documents to `.bak` before they are overwritten.
    pub backup_corrupt: bool,
    /// Let user refreshes add newly discovered users. When off, refreshes
    /// only re-normalize existing ones.
    pub add_new_users: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_status_file: PathBuf::from("user_status.json"),
            tags_file: PathBuf::from("tags.json"),
            lock_mode: LockPreference::Auto,
            backup_corrupt: true,
            add_new_users: true,
        }
    }
}

impl Config {
    /// Load `<home>/config.toml`, or defaults if there is none.
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&content).map_err(|e| {
            StoreError::Io(io::Error::new(
                ErrorKind::InvalidData,
                format!("failed to parse {}: {}", path.display(), e),
            ))
        })
    }

    pub fn user_status_path(&self, home: &Path) -> PathBuf {
        home.join(&self.user_status_file)
    }

    pub fn tags_path(&self, home: &Path) -> PathBuf {
        home.join(&self.tags_file)
    }
}

/// Resolve the home directory.
///
/// Precedence:
/// 1. `home_override` parameter (from --home CLI flag)
/// 2. `TAGSTATE_HOME` environment variable
/// 3. `~/.tagstate` default
pub fn resolve_home(home_override: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = home_override {
        return Ok(path);
    }
    if let Ok(home) = std::env::var(HOME_ENV)
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }
    let home = dirs_next::home_dir()
        .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "Home directory not found"))?;
    Ok(home.join(".tagstate"))
}
