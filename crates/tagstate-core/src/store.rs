//! The user-status store.
//!
//! Wraps the user-status [`JsonDocument`] and normalizes everything it hands
//! out against the current tag catalog. Reads go straight to disk without the
//! exclusive lock and may trail a mutation in flight; every write goes through
//! [`UserStatusStore::mutate`].

use crate::catalog::{TagCatalog, TagCatalogStore};
use crate::document::{Document, JsonDocument};
use crate::error::{Result, StoreError};
use crate::lock::{LockMode, LockPreference};
use crate::normalize::{normalize_in_place, normalize_value};
use crate::schema::{PromptItem, TagEntry, UserStatusDocument};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

impl Document for UserStatusDocument {
    const KIND: &'static str = "user-status document";

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        UserStatusDocument::from_value(value)
    }
}

pub struct UserStatusStore {
    doc: JsonDocument<UserStatusDocument>,
    catalog: Arc<TagCatalogStore>,
}

impl UserStatusStore {
    pub fn open(
        path: &Path,
        catalog: Arc<TagCatalogStore>,
        lock: LockPreference,
        backup_corrupt: bool,
    ) -> Self {
        Self {
            doc: JsonDocument::open(path, lock, backup_corrupt),
            catalog,
        }
    }

    pub fn path(&self) -> &Path {
        self.doc.path()
    }

    pub fn lock_mode(&self) -> LockMode {
        self.doc.lock_mode()
    }

    pub fn catalog(&self) -> &TagCatalogStore {
        &self.catalog
    }

    /// Normalized snapshot, read without the exclusive lock.
    pub fn load(&self) -> Result<UserStatusDocument> {
        let catalog = self.catalog.load()?;
        let mut doc = self.doc.load()?;
        normalize_in_place(&mut doc, &catalog);
        Ok(doc)
    }

    /// Apply `mutator` to the normalized document under the exclusive lock
    /// and persist the result. Nothing is written if `mutator` fails.
    pub fn mutate<R>(
        &self,
        mutator: impl FnOnce(&mut UserStatusDocument) -> Result<R>,
    ) -> Result<R> {
        let catalog = self.catalog.load()?;
        self.doc.update(|doc| {
            normalize_in_place(doc, &catalog);
            mutator(doc)
        })
    }

    /// Add an empty tag map for every username not yet present, then
    /// normalize against `catalog`. Existing users are never removed.
    /// Returns the usernames that were added.
    pub fn sync_users<S: AsRef<str>>(
        &self,
        known_usernames: &[S],
        catalog: &TagCatalog,
    ) -> Result<Vec<String>> {
        let added = self.doc.update(|doc| {
            let mut added = Vec::new();
            for username in known_usernames {
                let username = username.as_ref().trim();
                if username.is_empty() || doc.contains_user(username) {
                    continue;
                }
                doc.user_or_default(username);
                added.push(username.to_string());
            }
            normalize_in_place(doc, catalog);
            Ok(added)
        })?;
        if !added.is_empty() {
            log::info!("added {} user(s): {}", added.len(), added.join(", "));
        }
        Ok(added)
    }

    /// The stored document exactly as on disk.
    pub fn get_value(&self) -> Result<Value> {
        self.doc.read_value()
    }

    /// Replace the whole document. The payload must be an object of users,
    /// each an object of tag objects; it is normalized before being written.
    pub fn replace_value(&self, value: Value) -> Result<UserStatusDocument> {
        UserStatusDocument::validate_request(&value).map_err(StoreError::Validation)?;
        let catalog = self.catalog.load()?;
        let replacement = normalize_value(value, &catalog).map_err(StoreError::Validation)?;
        self.doc.update(|doc| {
            *doc = replacement.clone();
            Ok(())
        })?;
        Ok(replacement)
    }

    pub fn set_status(&self, username: &str, tag: &str, status: bool) -> Result<()> {
        self.with_entry(username, tag, |entry| {
            entry.status = status;
            Ok(())
        })
    }

    /// Add a prompt to the tag's list, replacing one with the same title.
    pub fn upsert_prompt(&self, username: &str, tag: &str, item: PromptItem) -> Result<()> {
        if item.title.trim().is_empty() {
            return Err(StoreError::validation("prompt title must not be blank"));
        }
        self.with_entry(username, tag, |entry| {
            entry.upsert_prompt(item);
            Ok(())
        })
    }

    /// Store a prompt selection: a title from the list, literal prompt text,
    /// or an empty string to clear it.
    pub fn select_prompt(&self, username: &str, tag: &str, selection: &str) -> Result<()> {
        self.with_entry(username, tag, |entry| {
            entry.selected_prompt = selection.to_string();
            Ok(())
        })
    }

    /// Mutate one entry. The tag must be in the catalog or already exist for
    /// the user; a new user is created on first reference.
    fn with_entry(
        &self,
        username: &str,
        tag: &str,
        f: impl FnOnce(&mut TagEntry) -> Result<()>,
    ) -> Result<()> {
        if username.trim().is_empty() {
            return Err(StoreError::validation("username must not be blank"));
        }
        let catalog = self.catalog.load()?;
        self.doc.update(|doc| {
            let known = catalog.contains(tag)
                || doc.user(username).is_some_and(|tags| tags.get(tag).is_some());
            if !known {
                return Err(StoreError::validation(format!(
                    "unknown tag '{tag}' for user '{username}'"
                )));
            }
            normalize_in_place(doc, &catalog);
            f(doc.user_or_default(username).entry_or_default(tag))
        })
    }
}
