// tagstate-cli: command-line front end for the tag-state stores
// Dispatches each subcommand to tagstate-core and prints JSON results

mod cli;

use clap::Parser;
use cli::{Cli, Command, DocumentCommand, PromptCommand};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tagstate_core::safe_io::to_json_pretty;
use tagstate_core::{
    PromptItem, Result, StaticUsers, StoreError, TagGate, UploadedDocument, UserDirectory,
    UsersFile,
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[ERROR] {e}");
            // 2: the document itself is missing or unreadable
            if e.is_recoverable() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let gate = TagGate::load(cli.home)?;
    log::debug!("home: {}", gate.home_dir().display());

    match cli.command {
        Command::Status(DocumentCommand::Get) => print_json(&gate.store().get_value()?),
        Command::Status(DocumentCommand::Replace { source }) => {
            let doc = gate.store().replace_value(read_request(&source)?)?;
            print_json(&doc)
        }
        Command::Tags(DocumentCommand::Get) => print_json(&gate.catalog().get_value()?),
        Command::Tags(DocumentCommand::Replace { source }) => {
            let catalog = gate.catalog().replace_value(&read_request(&source)?)?;
            print_json(&catalog)
        }
        Command::Sync { users, users_file } => {
            let mut names = StaticUsers(users).usernames()?;
            if let Some(path) = users_file {
                names.extend(UsersFile::new(path).usernames()?);
            }
            let catalog = gate.catalog().load()?;
            let added = gate.store().sync_users(&names, &catalog)?;
            print_json(&added)
        }
        Command::Enable { user, tag } => gate.store().set_status(&user, &tag, true),
        Command::Disable { user, tag } => gate.store().set_status(&user, &tag, false),
        Command::Prompt(PromptCommand::Add {
            user,
            tag,
            title,
            content,
        }) => gate
            .store()
            .upsert_prompt(&user, &tag, PromptItem::new(title, content)),
        Command::Prompt(PromptCommand::Select { user, tag, value }) => {
            gate.store().select_prompt(&user, &tag, &value)
        }
        Command::Prefix { user } => {
            // No output when the caller should keep its default prefix
            if let Some(prefix) = gate.resolve_prompt_prefix(&user) {
                println!("{prefix}");
            }
            Ok(())
        }
        Command::RecallMetadata { user } => {
            print_json(&gate.build_recall_filter_metadata(&user))
        }
        Command::Upload { user, paths } => {
            let documents = paths
                .into_iter()
                .map(|path| UploadedDocument::new(String::new(), path))
                .collect();
            let enriched = gate.enrich_and_persist_uploaded_docs(&user, documents)?;
            print_json(&enriched)
        }
        Command::LockMode => {
            let (status, tags) = gate.lock_modes();
            println!("{}: {status}", gate.store().path().display());
            println!("{}: {tags}", gate.catalog().path().display());
            Ok(())
        }
    }
}

/// Read a JSON request body from a file, or from stdin when `source` is "-".
fn read_request(source: &str) -> Result<Value> {
    let raw = if source == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(PathBuf::from(source))?
    };
    serde_json::from_str(&raw)
        .map_err(|e| StoreError::validation(format!("request body is not JSON: {e}")))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let bytes = to_json_pretty(value)?;
    io::stdout().lock().write_all(&bytes)?;
    Ok(())
}
