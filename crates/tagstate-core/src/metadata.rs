//! Filtering metadata derived from a user's enabled tags, and recording of
//! uploaded documents against those tags.

use crate::error::Result;
use crate::schema::{UserStatusDocument, document_basename};
use crate::store::UserStatusStore;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key carrying the uploaded file path.
pub const SOURCE_KEY: &str = "source";

/// A document on its way into the knowledge store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UploadedDocument {
    #[serde(default)]
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl UploadedDocument {
    pub fn new(page_content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert(SOURCE_KEY.to_string(), Value::String(source.into()));
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }
}

/// Tags with `status == true` for the user, in stored order.
pub fn active_tags(doc: &UserStatusDocument, username: &str) -> Vec<String> {
    doc.user(username)
        .map(|tags| {
            tags.iter()
                .filter(|(_, entry)| entry.status)
                .map(|(tag, _)| tag.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// `{tag: true}` for every active tag, plus `{username: true}`.
pub fn active_tag_metadata(doc: &UserStatusDocument, username: &str) -> IndexMap<String, bool> {
    metadata_for(&active_tags(doc, username), username)
}

pub(crate) fn metadata_for(active: &[String], username: &str) -> IndexMap<String, bool> {
    let mut metadata: IndexMap<String, bool> =
        active.iter().map(|tag| (tag.clone(), true)).collect();
    metadata.insert(username.to_string(), true);
    metadata
}

/// Record uploaded documents under each active tag.
///
/// Paths are reduced to file names; names already listed are skipped. All
/// tags and names are applied in one locked mutation.
pub fn merge_document_references<S: AsRef<str>>(
    store: &UserStatusStore,
    username: &str,
    active_tags: &[String],
    incoming_paths: &[S],
) -> Result<()> {
    let names: IndexSet<String> = incoming_paths
        .iter()
        .filter_map(|path| document_basename(path.as_ref()))
        .collect();
    if names.is_empty() || active_tags.is_empty() {
        return Ok(());
    }

    store.mutate(|doc| {
        let tags = doc.user_or_default(username);
        for tag in active_tags {
            let entry = tags.entry_or_default(tag);
            for name in &names {
                entry.add_document(name);
            }
        }
        Ok(())
    })?;

    log::debug!(
        "recorded {} document(s) for '{username}' under {}",
        names.len(),
        active_tags.join(", ")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{TagCatalog, TagCatalogStore};
    use crate::lock::LockPreference;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> UserStatusStore {
        let catalog = Arc::new(TagCatalogStore::open(
            &dir.path().join("tags.json"),
            LockPreference::Auto,
            true,
        ));
        catalog.replace(TagCatalog::new(["finance", "legal"])).unwrap();
        UserStatusStore::open(
            &dir.path().join("user_status.json"),
            catalog,
            LockPreference::Auto,
            true,
        )
    }

    fn documents(store: &UserStatusStore, user: &str, tag: &str) -> Vec<String> {
        store
            .load()
            .unwrap()
            .user(user)
            .and_then(|tags| tags.get(tag))
            .map(|entry| entry.documents.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_active_tag_metadata_includes_user() {
        let doc = UserStatusDocument::from_value(json!({
            "alice": {
                "finance": {"status": true},
                "legal": {"status": false}
            }
        }))
        .unwrap();

        let metadata = active_tag_metadata(&doc, "alice");
        let pairs: Vec<_> = metadata.into_iter().collect();
        assert_eq!(
            pairs,
            vec![("finance".to_string(), true), ("alice".to_string(), true)]
        );
    }

    #[test]
    fn test_unknown_user_gets_identity_only() {
        let metadata = active_tag_metadata(&UserStatusDocument::default(), "ghost");
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.get("ghost"), Some(&true));
    }

    #[test]
    fn test_merge_dedups_by_basename() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let active = vec!["finance".to_string()];

        merge_document_references(&store, "alice", &active, &["a/x.pdf", "x.pdf", "y.pdf"]).unwrap();
        merge_document_references(&store, "alice", &active, &["x.pdf"]).unwrap();

        assert_eq!(documents(&store, "alice", "finance"), vec!["x.pdf", "y.pdf"]);
        assert!(documents(&store, "alice", "legal").is_empty());
    }

    #[test]
    fn test_merge_into_several_tags_at_once() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let active = vec!["finance".to_string(), "legal".to_string()];

        merge_document_references(&store, "alice", &active, &["/tmp/report.pdf"]).unwrap();

        assert_eq!(documents(&store, "alice", "finance"), vec!["report.pdf"]);
        assert_eq!(documents(&store, "alice", "legal"), vec!["report.pdf"]);
    }

    #[test]
    fn test_merge_without_names_does_not_write() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        merge_document_references(&store, "alice", &["finance".to_string()], &["  ", ""]).unwrap();
        merge_document_references::<&str>(&store, "alice", &[], &["x.pdf"]).unwrap();

        assert!(!store.path().exists());
    }

    #[test]
    fn test_uploaded_document_source() {
        let doc = UploadedDocument::new("text", "/tmp/report.pdf");
        assert_eq!(doc.source(), Some("/tmp/report.pdf"));
        assert_eq!(UploadedDocument::default().source(), None);
    }
}
