//! Exclusive access to a single on-disk document.
//!
//! Every document has its own [`ExclusiveLock`]. Acquiring it always takes an
//! in-process mutex first, then (in [`LockMode::Advisory`]) an fs2 advisory
//! lock on the sibling `<file>.lock`. Threads sharing one lock instance
//! serialize on the mutex; independent instances and independent processes
//! serialize on the file lock.
//!
//! When the filesystem refuses advisory locks the lock degrades permanently to
//! [`LockMode::ProcessLocal`]. In that mode only callers sharing the same
//! `ExclusiveLock` instance are serialized: other processes, and other
//! instances for the same path, are not.

use crate::error::{Result, StoreError};
use crate::safe_io::{FileLock, sibling_path};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Which mechanism currently guards a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// OS advisory lock plus in-process mutex. Safe across processes.
    Advisory,
    /// In-process mutex only. Safe across threads sharing the store.
    ProcessLocal,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Advisory => write!(f, "advisory"),
            LockMode::ProcessLocal => write!(f, "process-local"),
        }
    }
}

/// Configured lock strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPreference {
    /// Try advisory locks, degrade to process-local if unsupported.
    #[default]
    Auto,
    /// Never touch advisory locks.
    Process,
}

// errno values meaning "this filesystem cannot do advisory locks"
#[cfg(target_os = "linux")]
const LOCKING_UNSUPPORTED: &[i32] = &[
    37, // ENOLCK
    38, // ENOSYS
    95, // EOPNOTSUPP
];
#[cfg(target_os = "macos")]
const LOCKING_UNSUPPORTED: &[i32] = &[
    45,  // ENOTSUP
    77,  // ENOLCK
    78,  // ENOSYS
    102, // EOPNOTSUPP
];
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const LOCKING_UNSUPPORTED: &[i32] = &[];

/// True if `err` says the platform or filesystem cannot lock, as opposed to
/// an ordinary I/O failure.
pub fn is_locking_unsupported(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Unsupported
        || err
            .raw_os_error()
            .is_some_and(|code| LOCKING_UNSUPPORTED.contains(&code))
}

pub struct ExclusiveLock {
    lock_path: PathBuf,
    local: Mutex<()>,
    degraded: AtomicBool,
    file_lock: fn(&Path) -> io::Result<FileLock>,
}

/// Held for the duration of a critical section. Releases the file lock, then
/// the mutex, when dropped.
pub struct ExclusiveGuard<'a> {
    _file: Option<FileLock>,
    _local: MutexGuard<'a, ()>,
}

impl ExclusiveLock {
    /// Lock guarding the document at `path`.
    pub fn new(path: &Path, preference: LockPreference) -> Self {
        Self {
            lock_path: sibling_path(path, "lock"),
            local: Mutex::new(()),
            degraded: AtomicBool::new(preference == LockPreference::Process),
            file_lock: FileLock::acquire,
        }
    }

    #[cfg(test)]
    fn with_file_lock(mut self, file_lock: fn(&Path) -> io::Result<FileLock>) -> Self {
        self.file_lock = file_lock;
        self
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn mode(&self) -> LockMode {
        if self.degraded.load(Ordering::SeqCst) {
            LockMode::ProcessLocal
        } else {
            LockMode::Advisory
        }
    }

    /// Block until this caller has exclusive access.
    pub fn acquire(&self) -> Result<ExclusiveGuard<'_>> {
        // A panicking mutator cannot leave the document half-written, so a
        // poisoned mutex carries no broken state.
        let local = self.local.lock().unwrap_or_else(PoisonError::into_inner);

        let file = match self.mode() {
            LockMode::ProcessLocal => None,
            LockMode::Advisory => match (self.file_lock)(&self.lock_path) {
                Ok(lock) => Some(lock),
                Err(e) if is_locking_unsupported(&e) => {
                    self.degrade(e);
                    None
                }
                Err(e) => return Err(e.into()),
            },
        };

        log::debug!(
            "acquired {} lock for {}",
            self.mode(),
            self.lock_path.display()
        );

        Ok(ExclusiveGuard {
            _file: file,
            _local: local,
        })
    }

    fn degrade(&self, source: io::Error) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            let err = StoreError::LockUnavailable {
                path: self.lock_path.clone(),
                source,
            };
            log::warn!("{err}; falling back to a process-local lock, other processes are no longer excluded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_auto_preference_starts_advisory() {
        let temp_dir = TempDir::new().unwrap();
        let lock = ExclusiveLock::new(&temp_dir.path().join("doc.json"), LockPreference::Auto);
        assert_eq!(lock.mode(), LockMode::Advisory);

        let _guard = lock.acquire().unwrap();
        assert!(temp_dir.path().join("doc.json.lock").exists());
    }

    #[test]
    fn test_process_preference_never_creates_lock_file() {
        let temp_dir = TempDir::new().unwrap();
        let lock = ExclusiveLock::new(&temp_dir.path().join("doc.json"), LockPreference::Process);
        assert_eq!(lock.mode(), LockMode::ProcessLocal);

        let _guard = lock.acquire().unwrap();
        assert!(!lock.lock_path().exists());
    }

    #[test]
    fn test_advisory_guard_excludes_other_handles() {
        let temp_dir = TempDir::new().unwrap();
        let lock = ExclusiveLock::new(&temp_dir.path().join("doc.json"), LockPreference::Auto);

        let guard = lock.acquire().unwrap();
        assert!(FileLock::try_acquire(lock.lock_path()).unwrap().is_none());
        drop(guard);
        assert!(FileLock::try_acquire(lock.lock_path()).unwrap().is_some());
    }

    #[test]
    fn test_process_local_serializes_threads() {
        let temp_dir = TempDir::new().unwrap();
        let lock = Arc::new(ExclusiveLock::new(
            &temp_dir.path().join("doc.json"),
            LockPreference::Process,
        ));
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    let _guard = lock.acquire().unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_unsupported_errors_are_classified() {
        assert!(is_locking_unsupported(&io::Error::from(
            io::ErrorKind::Unsupported
        )));
        assert!(!is_locking_unsupported(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
    }

    #[test]
    fn test_unsupported_lock_degrades_once_and_for_good() {
        static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);
        fn refuse(_: &Path) -> io::Result<FileLock> {
            ATTEMPTS.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }

        let temp_dir = TempDir::new().unwrap();
        let lock = ExclusiveLock::new(&temp_dir.path().join("doc.json"), LockPreference::Auto)
            .with_file_lock(refuse);
        assert_eq!(lock.mode(), LockMode::Advisory);

        drop(lock.acquire().unwrap());
        assert_eq!(lock.mode(), LockMode::ProcessLocal);

        drop(lock.acquire().unwrap());
        drop(lock.acquire().unwrap());
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 1);
        assert_eq!(lock.mode(), LockMode::ProcessLocal);
    }

    #[test]
    fn test_other_lock_failures_are_returned() {
        fn deny(_: &Path) -> io::Result<FileLock> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }

        let temp_dir = TempDir::new().unwrap();
        let lock = ExclusiveLock::new(&temp_dir.path().join("doc.json"), LockPreference::Auto)
            .with_file_lock(deny);

        assert!(matches!(lock.acquire(), Err(StoreError::Io(_))));
        assert_eq!(lock.mode(), LockMode::Advisory);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_enolck_is_unsupported_on_linux() {
        assert!(is_locking_unsupported(&io::Error::from_raw_os_error(37)));
        assert!(!is_locking_unsupported(&io::Error::from_raw_os_error(11)));
    }
}
