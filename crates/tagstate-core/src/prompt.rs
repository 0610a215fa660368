//! Choosing the prompt prefix for a user.
//!
//! `selected_prompt` may hold either a title from `prompt_list` or the prompt
//! text itself. Resolution order:
//!
//! 1. blank selection: no prompt
//! 2. matches some item's content: the selection is the prompt
//! 3. matches some item's title: that item's content, or no prompt if blank
//! 4. anything else: the selection is literal prompt text
//!
//! All comparisons are on trimmed strings. The legacy `prompt` field is never
//! consulted.

use crate::schema::{TagEntry, UserStatusDocument};

pub fn resolve_selected_prompt(entry: &TagEntry) -> Option<String> {
    let selected = entry.selected_prompt.trim();
    if selected.is_empty() {
        return None;
    }

    if entry
        .prompt_list
        .iter()
        .any(|item| item.content.trim() == selected)
    {
        return Some(selected.to_string());
    }

    if let Some(item) = entry
        .prompt_list
        .iter()
        .find(|item| item.title.trim() == selected)
    {
        let content = item.content.trim();
        return (!content.is_empty()).then(|| content.to_string());
    }

    Some(selected.to_string())
}

/// First resolvable prompt among the user's enabled tags, in stored order.
pub fn resolve_prefix_for_user(doc: &UserStatusDocument, username: &str) -> Option<String> {
    doc.user(username)?
        .iter()
        .filter(|(_, entry)| entry.status)
        .find_map(|(_, entry)| resolve_selected_prompt(entry))
}
