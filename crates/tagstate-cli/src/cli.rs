//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tagstate - manage per-user tag state for the chat pipeline
#[derive(Parser, Debug)]
#[command(name = "tagstate", version, after_help = CLI_AFTER_HELP)]
pub struct Cli {
    /// Home directory (overrides TAGSTATE_HOME and ~/.tagstate)
    #[arg(long, value_name = "DIR", global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Read or replace the whole user-status document
    #[command(subcommand)]
    Status(DocumentCommand),

    /// Read or replace the whole tag catalog
    #[command(subcommand)]
    Tags(DocumentCommand),

    /// Add users from the identity store and fill in missing tags
    Sync {
        /// Username to add (repeatable)
        #[arg(long = "user", value_name = "NAME")]
        users: Vec<String>,
        /// JSON export of the identity store
        #[arg(long, value_name = "FILE")]
        users_file: Option<PathBuf>,
    },

    /// Enable a tag for a user
    Enable { user: String, tag: String },

    /// Disable a tag for a user
    Disable { user: String, tag: String },

    /// Manage a tag's prompt list
    #[command(subcommand)]
    Prompt(PromptCommand),

    /// Print the prompt prefix the pipeline would use for a user
    Prefix { user: String },

    /// Print the recall filter metadata for a user
    RecallMetadata { user: String },

    /// Record uploaded documents under the user's enabled tags
    Upload {
        user: String,
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<String>,
    },

    /// Show which lock mechanism guards each document
    LockMode,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum DocumentCommand {
    /// Print the document as stored
    Get,
    /// Replace the document with the JSON in FILE ('-' for stdin)
    Replace {
        #[arg(value_name = "FILE")]
        source: String,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum PromptCommand {
    /// Add a prompt, replacing one with the same title
    Add {
        user: String,
        tag: String,
        title: String,
        content: String,
    },
    /// Select a prompt by title, or store literal prompt text ("" clears)
    Select {
        user: String,
        tag: String,
        value: String,
    },
}

const CLI_AFTER_HELP: &str = r#"Files (under the home directory):
  config.toml         optional settings
  user_status.json    per-user tag state
  tags.json           tag catalog

Examples:
  tagstate tags replace tags.json
  tagstate sync --users-file users.json
  tagstate enable alice finance
  tagstate upload alice /tmp/report.pdf
  tagstate recall-metadata alice

Set RUST_LOG=debug to trace locking and commits."#;
