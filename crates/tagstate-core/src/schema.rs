//! Typed records for the user-status document.
//!
//! On disk the document is
//! `{ "<user>": { "<tag>": { "status", "documents", "prompt_list",
//! "selected_prompt", "prompt" } } }`. Parsing is lenient: a missing or
//! mistyped field falls back to its default, a user whose value is not an
//! object becomes an empty tag map, and unknown keys inside an entry are
//! carried through untouched.

use crate::json_ext::JsonExt;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::path::Path;

const STATUS: &str = "status";
const DOCUMENTS: &str = "documents";
const PROMPT_LIST: &str = "prompt_list";
const SELECTED_PROMPT: &str = "selected_prompt";
const LEGACY_PROMPT: &str = "prompt";
const KNOWN_FIELDS: [&str; 5] = [STATUS, DOCUMENTS, PROMPT_LIST, SELECTED_PROMPT, LEGACY_PROMPT];

/// Why `value` does not have the type of the known entry field `key`.
/// Unknown keys and `null` prompt strings always pass.
fn field_mismatch(key: &str, value: &Value) -> Option<String> {
    match key {
        STATUS if !value.is_boolean() => Some(format!("expected a boolean, found {}", kind(value))),
        DOCUMENTS => match value.as_array() {
            None => Some(format!("expected an array of strings, found {}", kind(value))),
            Some(items) => items
                .iter()
                .enumerate()
                .find(|(_, item)| !item.is_string())
                .map(|(i, item)| format!("item {i}: expected a string, found {}", kind(item))),
        },
        PROMPT_LIST => match value.as_array() {
            None => Some(format!("expected an array of prompts, found {}", kind(value))),
            Some(items) => items
                .iter()
                .enumerate()
                .find_map(|(i, item)| prompt_mismatch(item).map(|reason| format!("item {i}: {reason}"))),
        },
        SELECTED_PROMPT | LEGACY_PROMPT if !(value.is_string() || value.is_null()) => {
            Some(format!("expected a string, found {}", kind(value)))
        }
        _ => None,
    }
}

fn prompt_mismatch(item: &Value) -> Option<String> {
    let Some(map) = item.as_object() else {
        return Some(format!("expected an object, found {}", kind(item)));
    };
    ["prompt_title", "prompt_content"].into_iter().find_map(|key| match map.get(key) {
        Some(Value::String(_)) => None,
        Some(other) => Some(format!("'{key}' should be a string, found {}", kind(other))),
        None => Some(format!("'{key}' is missing")),
    })
}

/// Reduce an uploaded path to the file name stored in `documents`.
///
/// Returns `None` for blank input and for paths without a file name
/// (`".."`, `"/"`).
pub fn document_basename(path: &str) -> Option<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }
    Path::new(trimmed)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromptItem {
    #[serde(rename = "prompt_title", default)]
    pub title: String,
    #[serde(rename = "prompt_content", default)]
    pub content: String,
}

impl PromptItem {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        Some(Self {
            title: map.get_str_or("prompt_title", "").to_string(),
            content: map.get_str_or("prompt_content", "").to_string(),
        })
    }
}

/// Per-user, per-tag state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TagEntry {
    pub status: bool,
    /// File names only, unique, in upload order.
    pub documents: IndexSet<String>,
    pub prompt_list: Vec<PromptItem>,
    /// Either a prompt title or literal prompt content.
    pub selected_prompt: String,
    /// Older single-prompt field. Read and written back, never set here.
    #[serde(rename = "prompt")]
    pub legacy_prompt: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TagEntry {
    /// Build an entry from a stored object, defaulting each field on its own.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        for key in KNOWN_FIELDS {
            if let Some(value) = map.get(key).filter(|v| !v.is_null())
                && let Some(reason) = field_mismatch(key, value)
            {
                log::warn!("discarding unreadable '{key}' in a tag entry: {reason}");
            }
        }

        let status = map.get_bool_or(STATUS, false);
        let documents = map
            .get_array(DOCUMENTS)
            .map(|docs| {
                docs.iter()
                    .filter_map(Value::as_str)
                    .filter_map(document_basename)
                    .collect()
            })
            .unwrap_or_default();
        let prompt_list = map
            .get_array(PROMPT_LIST)
            .map(|items| items.iter().filter_map(PromptItem::from_value).collect())
            .unwrap_or_default();
        let selected_prompt = map.get_str_or(SELECTED_PROMPT, "").to_string();
        let legacy_prompt = map.get_str_or(LEGACY_PROMPT, "").to_string();

        for key in KNOWN_FIELDS {
            map.shift_remove(key);
        }

        Self {
            status,
            documents,
            prompt_list,
            selected_prompt,
            legacy_prompt,
            extra: map,
        }
    }

    /// Append a document name unless it is already listed.
    pub fn add_document(&mut self, name: &str) -> bool {
        self.documents.insert(name.to_string())
    }

    /// Replace the prompt with the same title, or append a new one.
    pub fn upsert_prompt(&mut self, item: PromptItem) {
        match self.prompt_list.iter_mut().find(|p| p.title == item.title) {
            Some(existing) => existing.content = item.content,
            None => self.prompt_list.push(item),
        }
    }
}

/// A stored tag value: a typed entry, or a non-object value kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct TagSlot {
    entry: TagEntry,
    opaque: Option<Value>,
}

impl Serialize for TagSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.opaque {
            Some(value) => value.serialize(serializer),
            None => self.entry.serialize(serializer),
        }
    }
}

/// One user's tags, in stored order.
///
/// Values that are not objects are kept verbatim, in place, so that a tag
/// outside the catalog survives a rewrite unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct TagMap {
    tags: IndexMap<String, TagSlot>,
}

impl TagMap {
    pub fn from_map(map: Map<String, Value>) -> Self {
        let tags = map
            .into_iter()
            .map(|(tag, value)| {
                let slot = match value {
                    Value::Object(obj) => TagSlot {
                        entry: TagEntry::from_map(obj),
                        opaque: None,
                    },
                    other => TagSlot {
                        entry: TagEntry::default(),
                        opaque: Some(other),
                    },
                };
                (tag, slot)
            })
            .collect();
        Self { tags }
    }

    pub fn get(&self, tag: &str) -> Option<&TagEntry> {
        self.tags
            .get(tag)
            .filter(|slot| slot.opaque.is_none())
            .map(|slot| &slot.entry)
    }

    /// True if the tag is present in any form, typed or not.
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    /// The entry for `tag`, appended with defaults if missing. An untyped
    /// value stored under the same tag is replaced where it stands.
    pub fn entry_or_default(&mut self, tag: &str) -> &mut TagEntry {
        let slot = self.tags.entry(tag.to_string()).or_default();
        if slot.opaque.take().is_some() {
            log::warn!("tag '{tag}' held a non-object value, resetting it to defaults");
        }
        &mut slot.entry
    }

    /// Typed entries in stored order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TagEntry)> {
        self.tags
            .iter()
            .filter(|(_, slot)| slot.opaque.is_none())
            .map(|(tag, slot)| (tag, &slot.entry))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// The persisted root: username -> tags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct UserStatusDocument {
    users: IndexMap<String, TagMap>,
}

impl UserStatusDocument {
    /// Lenient parse of a stored document. Fails only if the root itself is
    /// not an object.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let root = match value {
            Value::Object(root) => root,
            other => {
                return Err(format!(
                    "expected an object at the root, found {}",
                    kind(&other)
                ));
            }
        };
        let mut users = IndexMap::with_capacity(root.len());
        for (user, tags) in root {
            let tags = match tags {
                Value::Object(map) => TagMap::from_map(map),
                other => {
                    log::warn!(
                        "user '{user}' held {} instead of a tag map, resetting it",
                        kind(&other)
                    );
                    TagMap::default()
                }
            };
            users.insert(user, tags);
        }
        Ok(Self { users })
    }

    /// Strict check for whole-document replacement requests: every user and
    /// every tag value must be an object, and every known entry field must
    /// have its stored type. `null` is accepted for the two prompt strings.
    pub fn validate_request(value: &Value) -> Result<(), String> {
        let root = value
            .as_object()
            .ok_or_else(|| format!("expected an object of users, found {}", kind(value)))?;
        for (user, tags) in root {
            if user.trim().is_empty() {
                return Err("usernames must not be blank".to_string());
            }
            let tags = tags.as_object().ok_or_else(|| {
                format!("user '{user}': expected an object of tags, found {}", kind(tags))
            })?;
            for (tag, entry) in tags {
                let fields = entry.as_object().ok_or_else(|| {
                    format!("user '{user}', tag '{tag}': expected an object, found {}", kind(entry))
                })?;
                for (key, value) in fields {
                    if let Some(reason) = field_mismatch(key, value) {
                        return Err(format!("user '{user}', tag '{tag}', field '{key}': {reason}"));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn user(&self, username: &str) -> Option<&TagMap> {
        self.users.get(username)
    }

    pub fn contains_user(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    /// The user's tag map, created empty if the user is new.
    pub fn user_or_default(&mut self, username: &str) -> &mut TagMap {
        self.users.entry(username.to_string()).or_default()
    }

    pub fn usernames(&self) -> impl Iterator<Item = &String> {
        self.users.keys()
    }

    pub fn users_mut(&mut self) -> impl Iterator<Item = (&String, &mut TagMap)> {
        self.users.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_basename() {
        assert_eq!(document_basename("/tmp/report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(document_basename("a/x.pdf").as_deref(), Some("x.pdf"));
        assert_eq!(document_basename("  x.pdf  ").as_deref(), Some("x.pdf"));
        assert_eq!(document_basename("   "), None);
        assert_eq!(document_basename(".."), None);
    }

    #[test]
    fn test_entry_fills_missing_fields_individually() {
        let entry = TagEntry::from_map(
            json!({"status": true, "selected_prompt": "greet"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert!(entry.status);
        assert_eq!(entry.selected_prompt, "greet");
        assert!(entry.documents.is_empty());
        assert!(entry.prompt_list.is_empty());
        assert_eq!(entry.legacy_prompt, "");
    }

    #[test]
    fn test_entry_defaults_mistyped_fields() {
        let entry = TagEntry::from_map(
            json!({"status": "yes", "documents": "a.pdf", "prompt": 3})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert!(!entry.status);
        assert!(entry.documents.is_empty());
        assert_eq!(entry.legacy_prompt, "");
    }

    #[test]
    fn test_entry_dedups_documents_by_basename() {
        let entry = TagEntry::from_map(
            json!({"documents": ["a/x.pdf", "x.pdf", "y.pdf", 7]})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let docs: Vec<_> = entry.documents.iter().cloned().collect();
        assert_eq!(docs, vec!["x.pdf", "y.pdf"]);
    }

    #[test]
    fn test_entry_keeps_unknown_keys() {
        let raw = json!({
            "status": false,
            "documents": [],
            "prompt_list": [],
            "selected_prompt": "",
            "prompt": "",
            "color": "red"
        });
        let entry = TagEntry::from_map(raw.as_object().cloned().unwrap());
        assert_eq!(entry.extra.get("color"), Some(&json!("red")));
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }

    #[test]
    fn test_prompt_list_skips_non_objects() {
        let entry = TagEntry::from_map(
            json!({"prompt_list": [
                {"prompt_title": "greet", "prompt_content": "Hello there"},
                "stray",
                {"prompt_title": "bare"}
            ]})
            .as_object()
            .cloned()
            .unwrap(),
        );
        assert_eq!(
            entry.prompt_list,
            vec![PromptItem::new("greet", "Hello there"), PromptItem::new("bare", "")]
        );
    }

    #[test]
    fn test_upsert_prompt_replaces_by_title() {
        let mut entry = TagEntry::default();
        entry.upsert_prompt(PromptItem::new("greet", "Hi"));
        entry.upsert_prompt(PromptItem::new("bye", "Bye"));
        entry.upsert_prompt(PromptItem::new("greet", "Hello there"));
        assert_eq!(
            entry.prompt_list,
            vec![PromptItem::new("greet", "Hello there"), PromptItem::new("bye", "Bye")]
        );
    }

    #[test]
    fn test_non_object_user_becomes_empty_map() {
        let doc = UserStatusDocument::from_value(json!({"alice": 5, "bob": {}})).unwrap();
        assert!(doc.user("alice").unwrap().is_empty());
        assert!(doc.user("bob").unwrap().is_empty());
    }

    #[test]
    fn test_root_must_be_object() {
        assert!(UserStatusDocument::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_opaque_tag_values_round_trip() {
        let raw = json!({"alice": {"archived": "n/a"}});
        let doc = UserStatusDocument::from_value(raw.clone()).unwrap();
        let alice = doc.user("alice").unwrap();
        assert!(alice.contains("archived"));
        assert!(alice.get("archived").is_none());
        assert_eq!(serde_json::to_value(&doc).unwrap(), raw);
    }

    #[test]
    fn test_entry_or_default_replaces_opaque_value() {
        let mut tags = TagMap::from_map(json!({"finance": true}).as_object().cloned().unwrap());
        tags.entry_or_default("finance").status = true;
        assert_eq!(tags.len(), 1);
        assert!(tags.get("finance").unwrap().status);
    }

    #[test]
    fn test_validate_request() {
        assert!(UserStatusDocument::validate_request(&json!({"alice": {"finance": {}}})).is_ok());
        assert!(UserStatusDocument::validate_request(&json!([])).is_err());
        assert!(UserStatusDocument::validate_request(&json!({"alice": []})).is_err());
        assert!(UserStatusDocument::validate_request(&json!({"alice": {"finance": true}})).is_err());
        assert!(UserStatusDocument::validate_request(&json!({" ": {}})).is_err());
    }

    #[test]
    fn test_validate_request_checks_field_types() {
        let ok = json!({"alice": {"finance": {
            "status": true,
            "documents": ["report.pdf"],
            "prompt_list": [{"prompt_title": "greet", "prompt_content": "Hello there"}],
            "selected_prompt": null,
            "prompt": "",
            "color": 7
        }}});
        assert!(UserStatusDocument::validate_request(&ok).is_ok());

        for (field, value) in [
            ("status", json!("true")),
            ("status", json!(null)),
            ("documents", json!("report.pdf")),
            ("documents", json!(["a.pdf", 3])),
            ("prompt_list", json!("oops")),
            ("prompt_list", json!([{"prompt_title": "greet"}])),
            ("prompt_list", json!(["greet"])),
            ("selected_prompt", json!(5)),
            ("prompt", json!(false)),
        ] {
            let request = json!({"alice": {"finance": {field: value}}});
            let err = UserStatusDocument::validate_request(&request).unwrap_err();
            assert!(err.contains(&format!("field '{field}'")), "{err}");
        }
    }

    #[test]
    fn test_field_mismatch_reports_reason() {
        assert_eq!(
            field_mismatch(STATUS, &json!(1)).as_deref(),
            Some("expected a boolean, found a number")
        );
        assert_eq!(
            field_mismatch(DOCUMENTS, &json!(["a.pdf", {}])).as_deref(),
            Some("item 1: expected a string, found an object")
        );
        assert!(field_mismatch(SELECTED_PROMPT, &json!(null)).is_none());
        assert!(field_mismatch("color", &json!([])).is_none());
    }

    #[test]
    fn test_replaced_opaque_value_keeps_its_position() {
        let mut tags = TagMap::from_map(
            json!({"finance": true, "legal": {"status": true}})
                .as_object()
                .cloned()
                .unwrap(),
        );
        tags.entry_or_default("finance");
        tags.entry_or_default("hr");
        let order: Vec<_> = tags.iter().map(|(tag, _)| tag.as_str()).collect();
        assert_eq!(order, vec!["finance", "legal", "hr"]);
    }

    #[test]
    fn test_opaque_values_stay_in_place_when_written() {
        let raw = json!({"alice": {"archived": "n/a", "finance": {"status": true}}});
        let mut doc = UserStatusDocument::from_value(raw).unwrap();
        doc.user_or_default("alice").entry_or_default("finance").status = false;
        let written = serde_json::to_value(&doc).unwrap();
        let keys: Vec<_> = written["alice"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["archived", "finance"]);
        assert_eq!(written["alice"]["archived"], json!("n/a"));
    }
}
