//! JSON value extraction helpers.
//!
//! Lenient accessors used when reading hand-edited or older documents,
//! where a field may be missing or carry the wrong type.

use serde_json::{Map, Value};

/// Extension trait for JSON value extraction.
///
/// Implementors only say how to look up a key; the typed getters are shared.
pub trait JsonExt {
    /// Raw value under `key`, if any
    fn field(&self, key: &str) -> Option<&Value>;

    /// Get a string value, returning None if key missing or not a string
    fn get_str(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    /// Get a string value with a default
    fn get_str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_str(key).unwrap_or(default)
    }

    /// Get a bool value, returning None if key missing or not a bool
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.field(key).and_then(Value::as_bool)
    }

    /// Get a bool value with a default (commonly false)
    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Get an array value, returning None if key missing or not an array
    fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.field(key).and_then(Value::as_array)
    }
}

impl JsonExt for Value {
    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

impl JsonExt for Map<String, Value> {
    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_str() {
        let v = json!({"selected_prompt": "greet", "status": true});
        assert_eq!(v.get_str("selected_prompt"), Some("greet"));
        assert_eq!(v.get_str("missing"), None);
        assert_eq!(v.get_str("status"), None); // not a string
    }

    #[test]
    fn test_get_str_or() {
        let v = json!({"prompt_title": "greet"});
        assert_eq!(v.get_str_or("prompt_title", ""), "greet");
        assert_eq!(v.get_str_or("prompt_content", ""), "");
    }

    #[test]
    fn test_get_bool_on_map() {
        let v = json!({"status": true, "prompt": "legacy"});
        let map = v.as_object().unwrap();
        assert_eq!(map.get_bool("status"), Some(true));
        assert_eq!(map.get_bool("prompt"), None); // not a bool
        assert!(!map.get_bool_or("missing", false));
    }

    #[test]
    fn test_get_array() {
        let v = json!({"documents": ["a.pdf", "b.pdf"], "status": false});
        assert_eq!(v.get_array("documents").unwrap().len(), 2);
        assert!(v.get_array("missing").is_none());
        assert!(v.get_array("status").is_none()); // not an array
    }
}
