//! The tag catalog: which tags every user must have.
//!
//! Stored as `{"tags": [...]}` next to the user-status document and guarded
//! by its own lock.

use crate::document::{Document, JsonDocument};
use crate::error::{Result, StoreError};
use crate::lock::{LockMode, LockPreference};
use crate::schema::kind;
use indexmap::IndexSet;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TagCatalog {
    tags: IndexSet<String>,
}

impl TagCatalog {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Strict parse of a replacement request: `{"tags": [string, ...]}`.
    /// Duplicates collapse; blank names are rejected.
    pub fn from_request(value: &Value) -> Result<Self> {
        let tags = value
            .get("tags")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::validation("expected {\"tags\": [string, ...]}"))?;

        let mut catalog = TagCatalog::default();
        for (i, tag) in tags.iter().enumerate() {
            let name = tag.as_str().ok_or_else(|| {
                StoreError::validation(format!("tags[{i}]: expected a string, found {}", kind(tag)))
            })?;
            if name.trim().is_empty() {
                return Err(StoreError::validation(format!("tags[{i}]: tag names must not be blank")));
            }
            catalog.tags.insert(name.to_string());
        }
        Ok(catalog)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Document for TagCatalog {
    const KIND: &'static str = "tag catalog";

    /// Lenient: integers become strings, anything else in the list is skipped.
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        let root = value
            .as_object()
            .ok_or_else(|| format!("expected an object at the root, found {}", kind(&value)))?;
        let tags = match root.get("tags") {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Array(tags)) => tags,
            Some(other) => return Err(format!("\"tags\" should be an array, found {}", kind(other))),
        };
        Ok(Self {
            tags: tags
                .iter()
                .filter_map(|tag| match tag {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        })
    }
}

/// Persistent handle on the catalog file.
pub struct TagCatalogStore {
    doc: JsonDocument<TagCatalog>,
}

impl TagCatalogStore {
    pub fn open(path: &Path, lock: LockPreference, backup_corrupt: bool) -> Self {
        Self {
            doc: JsonDocument::open(path, lock, backup_corrupt),
        }
    }

    pub fn path(&self) -> &Path {
        self.doc.path()
    }

    pub fn lock_mode(&self) -> LockMode {
        self.doc.lock_mode()
    }

    /// Current catalog; empty if the file is missing or unreadable.
    pub fn load(&self) -> Result<TagCatalog> {
        self.doc.load()
    }

    /// The file as stored, for the management surface.
    pub fn get_value(&self) -> Result<Value> {
        self.doc.read_value()
    }

    /// Validate and replace the whole catalog.
    pub fn replace_value(&self, value: &Value) -> Result<TagCatalog> {
        let catalog = TagCatalog::from_request(value)?;
        self.replace(catalog)
    }

    pub fn replace(&self, catalog: TagCatalog) -> Result<TagCatalog> {
        self.doc.update(|current| {
            *current = catalog.clone();
            Ok(())
        })?;
        log::info!("tag catalog replaced with {} tag(s)", catalog.len());
        Ok(catalog)
    }
}
