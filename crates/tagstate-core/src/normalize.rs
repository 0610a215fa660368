//! Bring a user-status document up to date with the tag catalog.
//!
//! Normalization only ever adds: every catalog tag gets an entry for every
//! user, and nothing outside the catalog is removed. Field-level defaults for
//! entries that already exist are applied while parsing (see
//! [`TagEntry::from_map`](crate::schema::TagEntry::from_map)), so a document
//! that went through [`UserStatusDocument::from_value`] and then
//! [`normalize`] satisfies the full schema.

use crate::catalog::TagCatalog;
use crate::schema::UserStatusDocument;
use serde_json::Value;

pub fn normalize(mut doc: UserStatusDocument, catalog: &TagCatalog) -> UserStatusDocument {
    normalize_in_place(&mut doc, catalog);
    doc
}

pub fn normalize_in_place(doc: &mut UserStatusDocument, catalog: &TagCatalog) {
    for (_, tags) in doc.users_mut() {
        for tag in catalog.iter() {
            tags.entry_or_default(tag);
        }
    }
}

/// Parse and normalize raw stored JSON in one step.
pub fn normalize_value(
    value: Value,
    catalog: &TagCatalog,
) -> Result<UserStatusDocument, String> {
    UserStatusDocument::from_value(value).map(|doc| normalize(doc, catalog))
}
