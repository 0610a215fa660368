//! High-level facade for the conversational pipeline.
//!
//! `TagGate` owns the tag catalog and the user-status store for one home
//! directory and exposes the three callbacks the pipeline invokes:
//!
//! - [`TagGate::resolve_prompt_prefix`] before prompt construction
//! - [`TagGate::build_recall_filter_metadata`] before memory recall
//! - [`TagGate::enrich_and_persist_uploaded_docs`] before documents are stored
//!
//! The read-side callbacks never fail: store problems are logged and the
//! caller gets the same answer it would get for a user with no tags.
//!
//! # Example
//!
//! ```no_run
//! use tagstate_core::TagGate;
//!
//! let gate = TagGate::load(None)?;
//! let prefix = gate
//!     .resolve_prompt_prefix("alice")
//!     .unwrap_or_else(|| "You are a helpful assistant.".to_string());
//! # Ok::<(), tagstate_core::StoreError>(())
//! ```

use crate::catalog::TagCatalogStore;
use crate::config::{Config, resolve_home};
use crate::error::Result;
use crate::lock::LockMode;
use crate::metadata::{
    UploadedDocument, active_tag_metadata, active_tags, merge_document_references, metadata_for,
};
use crate::prompt::resolve_prefix_for_user;
use crate::schema::UserStatusDocument;
use crate::store::UserStatusStore;
use crate::users::UserDirectory;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recall configuration key holding the metadata filter.
pub const RECALL_METADATA_KEY: &str = "metadata";

pub struct TagGate {
    home: PathBuf,
    config: Config,
    catalog: Arc<TagCatalogStore>,
    store: UserStatusStore,
}

impl TagGate {
    /// Open the stores under `home` with the given configuration.
    pub fn open(home: &Path, config: Config) -> Self {
        let catalog = Arc::new(TagCatalogStore::open(
            &config.tags_path(home),
            config.lock_mode,
            config.backup_corrupt,
        ));
        let store = UserStatusStore::open(
            &config.user_status_path(home),
            Arc::clone(&catalog),
            config.lock_mode,
            config.backup_corrupt,
        );
        Self {
            home: home.to_path_buf(),
            config,
            catalog,
            store,
        }
    }

    /// Resolve the home directory, read its `config.toml` and open the
    /// stores.
    pub fn load(home_override: Option<PathBuf>) -> Result<Self> {
        let home = resolve_home(home_override)?;
        let config = Config::load(&home)?;
        Ok(Self::open(&home, config))
    }

    pub fn home_dir(&self) -> &Path {
        &self.home
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &TagCatalogStore {
        &self.catalog
    }

    pub fn store(&self) -> &UserStatusStore {
        &self.store
    }

    /// Lock modes of the (user-status, catalog) documents.
    pub fn lock_modes(&self) -> (LockMode, LockMode) {
        (self.store.lock_mode(), self.catalog.lock_mode())
    }

    fn snapshot(&self, purpose: &str) -> UserStatusDocument {
        self.store.load().unwrap_or_else(|e| {
            log::warn!("{purpose}: user status unavailable ({e}); using defaults");
            UserStatusDocument::default()
        })
    }

    /// Prompt text chosen by the user's first enabled tag that has one.
    /// `None` means the caller keeps its own default prefix.
    pub fn resolve_prompt_prefix(&self, username: &str) -> Option<String> {
        resolve_prefix_for_user(&self.snapshot("prompt prefix"), username)
    }

    /// `{tag: true}` for each enabled tag plus `{username: true}`.
    pub fn build_recall_filter_metadata(&self, username: &str) -> IndexMap<String, bool> {
        active_tag_metadata(&self.snapshot("recall metadata"), username)
    }

    /// Merge the recall filter into `config["metadata"]`, keeping any keys
    /// already there unless the filter sets them too. A non-object
    /// `metadata` value is replaced.
    pub fn apply_recall_filter(&self, config: &mut Map<String, Value>, username: &str) {
        let filter = self.build_recall_filter_metadata(username);
        let slot = config
            .entry(RECALL_METADATA_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(metadata) = slot {
            for (key, flag) in filter {
                metadata.insert(key, Value::Bool(flag));
            }
        }
        log::debug!("recall metadata for '{username}': {slot}");
    }

    /// Tag each document with the user's active-tag metadata and record the
    /// documents' `source` file names under those tags.
    ///
    /// Metadata is merged into the documents even when the user has no
    /// enabled tags; the store is then left alone. All names are recorded in
    /// one atomic mutation; if it fails the error is returned and the store
    /// is unchanged.
    pub fn enrich_and_persist_uploaded_docs(
        &self,
        username: &str,
        mut documents: Vec<UploadedDocument>,
    ) -> Result<Vec<UploadedDocument>> {
        let active = active_tags(&self.snapshot("upload"), username);
        let metadata = metadata_for(&active, username);

        let mut sources = Vec::new();
        for doc in &mut documents {
            for (key, flag) in &metadata {
                doc.metadata.insert(key.clone(), Value::Bool(*flag));
            }
            if let Some(source) = doc.source() {
                sources.push(source.to_string());
            }
        }

        merge_document_references(&self.store, username, &active, &sources)?;
        Ok(documents)
    }

    /// Sync users from the identity collaborator. With `add_new_users`
    /// turned off, only existing users are re-normalized.
    pub fn refresh_users(&self, directory: &dyn UserDirectory) -> Result<Vec<String>> {
        let known = if self.config.add_new_users {
            directory.usernames()?
        } else {
            Vec::new()
        };
        let catalog = self.catalog.load()?;
        self.store.sync_users(&known, &catalog)
    }
}
