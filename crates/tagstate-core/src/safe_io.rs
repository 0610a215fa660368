//! Safe file I/O utilities: atomic writes and file locking.
//!
//! This module provides building blocks for safe concurrent file access:
//! - [`atomic_write_json()`] - Write JSON atomically (temp file + rename)
//! - [`StagedWrite`] - The two halves of an atomic write, for callers that
//!   need to act between staging and commit
//! - [`FileLock`] - RAII file locking wrapper using fs2
//! - [`preserve_corrupt()`] - Keep a copy of an unreadable document before it
//!   gets replaced
//!
//! Documents are written pretty-printed with a 4-space indent so that the
//! files stay diffable when operators edit them by hand.

use fs2::FileExt;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Path with `suffix` appended to the full file name
/// (`user_status.json` + `tmp` -> `user_status.json.tmp`).
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Serialize `value` as JSON with a 4-space indent.
pub fn to_json_pretty<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Atomically write JSON to a file.
///
/// Writes to a temporary file (`.tmp` suffix) with fsync, then renames to the
/// target path. The file is either fully written or unchanged - never
/// partially written due to crashes or power loss.
///
/// # Errors
///
/// Returns an error if:
/// - Serialization fails
/// - The temporary file cannot be created or written
/// - The rename operation fails (e.g., cross-device rename)
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    StagedWrite::json(path, value)?.commit()
}

/// Atomically write bytes to a file.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    StagedWrite::stage(path, contents)?.commit()
}

/// A fully written and synced temporary file waiting to be renamed onto its
/// target.
///
/// Dropping an uncommitted stage removes the temporary file; the target is
/// never touched until [`StagedWrite::commit`].
#[derive(Debug)]
pub struct StagedWrite {
    target: PathBuf,
    tmp_path: PathBuf,
    committed: bool,
}

impl StagedWrite {
    /// Write `contents` to `<path>.tmp` and fsync it.
    pub fn stage(path: &Path, contents: &[u8]) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = sibling_path(path, "tmp");

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(contents)?;
            writer.flush()?;
        }

        // Sync to disk before rename
        file.sync_all()?;

        Ok(Self {
            target: path.to_path_buf(),
            tmp_path,
            committed: false,
        })
    }

    /// Serialize `value` and stage it.
    pub fn json<T: Serialize>(path: &Path, value: &T) -> io::Result<Self> {
        let json = to_json_pretty(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Self::stage(path, &json)
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Rename the staged file onto the target.
    ///
    /// On Unix, rename is atomic within the same filesystem.
    pub fn commit(mut self) -> io::Result<()> {
        fs::rename(&self.tmp_path, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Copy an unreadable document aside before it is overwritten.
///
/// Uses `<file>.bak`, or `<file>.<timestamp>.bak` when an older backup is
/// already there. Returns the backup path.
pub fn preserve_corrupt(path: &Path) -> io::Result<PathBuf> {
    let mut backup = sibling_path(path, "bak");
    if backup.exists() {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f").to_string();
        backup = sibling_path(path, &format!("{stamp}.bak"));
    }
    fs::copy(path, &backup)?;
    Ok(backup)
}

/// RAII file lock using fs2 exclusive locking.
///
/// The lock is acquired when created and automatically released when dropped.
/// Uses advisory locking - processes must cooperate by acquiring locks on the
/// same lock file path.
///
/// # Blocking Behavior
///
/// `acquire()` blocks until the lock can be obtained. Use `try_acquire()` for
/// non-blocking lock attempts.
pub struct FileLock {
    file: File,
}

impl FileLock {
    fn open(lock_path: &Path) -> io::Result<File> {
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
    }

    /// Acquire an exclusive lock on the given path, blocking if necessary.
    ///
    /// Creates the lock file if it doesn't exist.
    pub fn acquire(lock_path: &Path) -> io::Result<Self> {
        let file = Self::open(lock_path)?;

        // Block until we can acquire exclusive lock
        file.lock_exclusive()?;

        Ok(Self { file })
    }

    /// Try to acquire an exclusive lock without blocking.
    ///
    /// Returns `Ok(Some(FileLock))` if the lock was acquired, `Ok(None)` if
    /// the lock is held elsewhere, or `Err` on any other failure.
    pub fn try_acquire(lock_path: &Path) -> io::Result<Option<Self>> {
        let file = Self::open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            // fs2 reports contention as a raw OS error on some platforms
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Release the lock using fs2's FileExt trait; ignore errors during drop
        let _ = FileExt::unlock(&self.file);
    }
}
