//! Sources of known usernames.
//!
//! The identity store lives outside this crate; [`UserDirectory`] is the
//! seam it plugs into when users are synced into the user-status document.

use crate::error::{Result, StoreError};
use crate::json_ext::JsonExt;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

pub trait UserDirectory {
    fn usernames(&self) -> Result<Vec<String>>;
}

/// A fixed list, e.g. from command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct StaticUsers(pub Vec<String>);

impl UserDirectory for StaticUsers {
    fn usernames(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// A JSON export of the identity store: either
/// `{"<id>": {"username": "..."}, ...}` or `[{"username": "..."}, ...]`.
/// Records without a string `username` are skipped.
#[derive(Debug, Clone)]
pub struct UsersFile {
    path: PathBuf,
}

impl UsersFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UserDirectory for UsersFile {
    fn usernames(&self) -> Result<Vec<String>> {
        let raw = fs::read_to_string(&self.path)?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let records: Vec<&Value> = match &value {
            Value::Object(map) => map.values().collect(),
            Value::Array(items) => items.iter().collect(),
            _ => {
                return Err(StoreError::Corrupt {
                    path: self.path.clone(),
                    reason: "expected an object or array of user records".to_string(),
                });
            }
        };
        Ok(records
            .into_iter()
            .filter_map(|record| record.get_str("username"))
            .map(str::to_string)
            .collect())
    }
}
