//! tagstate-core: per-user tag state for a conversational pipeline.
//!
//! Each user has a set of tags; each tag carries an enable flag, the names of
//! documents uploaded while it was enabled, and a list of selectable prompts.
//! The pipeline reads this state to pick a prompt prefix and to filter memory
//! recall, and writes to it when documents are uploaded.
//!
//! State lives in two JSON files (the user-status document and the tag
//! catalog). Every change is a locked read-modify-write that commits with an
//! atomic rename, so concurrent threads and processes never lose each
//! other's updates and readers never see a half-written file.
//!
//! # Quick Start
//!
//! ```no_run
//! use tagstate_core::{TagGate, UploadedDocument};
//!
//! let gate = TagGate::load(None)?;
//! gate.store().set_status("alice", "finance", true)?;
//!
//! let docs = gate.enrich_and_persist_uploaded_docs(
//!     "alice",
//!     vec![UploadedDocument::new("quarterly numbers", "/tmp/report.pdf")],
//! )?;
//! assert_eq!(docs[0].metadata["finance"], true);
//! # Ok::<(), tagstate_core::StoreError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod document;
pub mod error;
mod gate;
pub mod json_ext;
pub mod lock;
pub mod metadata;
pub mod normalize;
pub mod prompt;
pub mod safe_io;
pub mod schema;
pub mod store;
pub mod users;

// Re-export the facade
pub use gate::{RECALL_METADATA_KEY, TagGate};

// Re-export commonly used types
pub use catalog::{TagCatalog, TagCatalogStore};
pub use config::Config;
pub use error::{Result, StoreError};
pub use lock::{LockMode, LockPreference};
pub use metadata::UploadedDocument;
pub use schema::{PromptItem, TagEntry, TagMap, UserStatusDocument};
pub use store::UserStatusStore;
pub use users::{StaticUsers, UserDirectory, UsersFile};
