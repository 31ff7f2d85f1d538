//! Exclusive store lock.
//!
//! A collection file may be opened by one session at a time. The session
//! holds `<file>.lock`, created with create-new semantics and holding the
//! owner's pid; a second open fails fast with [`DbError::Locked`] instead of
//! interleaving writes.
//!
//! ## Stale Locks
//! ```text
//!   acquire ──► create <file>.lock ──ok──► locked
//!                    │
//!                    └─ exists ──► read pid ──► owner alive? ──yes──► Locked
//!                                                   │
//!                                                   └─ no ──► take over
//! ```
//! Liveness is only known where the platform exposes it (`/proc`). Elsewhere
//! a leftover lock must be removed with [`StoreLock::break_lock`].

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};

/// Lock file guard. The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Path of the lock file guarding `store`.
    pub fn path_for(store: &Path) -> PathBuf {
        let mut name = OsString::from(store.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Takes the lock, replacing one left behind by a process that is gone.
    pub fn acquire(store: &Path) -> DbResult<Self> {
        match Self::try_create(store)? {
            Some(lock) => Ok(lock),
            None => {
                let path = Self::path_for(store);
                match read_owner(&path) {
                    Some(pid) if !process_alive(pid) => {
                        info!(lock = %path.display(), pid, "Taking over stale store lock");
                        remove_lock_file(&path)?;
                        Self::try_create(store)?.ok_or_else(|| DbError::Locked(store.to_path_buf()))
                    }
                    _ => Err(DbError::Locked(store.to_path_buf())),
                }
            }
        }
    }

    /// Removes the lock of `store` whoever holds it.
    ///
    /// For recovering after a crash on platforms where the owner's liveness
    /// cannot be checked. Returns whether a lock file existed. Breaking the
    /// lock of a live session lets two sessions write the same file.
    pub fn break_lock(store: &Path) -> DbResult<bool> {
        let path = Self::path_for(store);
        let existed = remove_lock_file(&path)?;
        if existed {
            warn!(lock = %path.display(), "Store lock broken");
        }
        Ok(existed)
    }

    /// Pid recorded in the lock of `store`, if locked.
    pub fn owner(store: &Path) -> Option<u32> {
        read_owner(&Self::path_for(store))
    }

    fn try_create(store: &Path) -> DbResult<Option<Self>> {
        let path = Self::path_for(store);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;

        debug!(lock = %path.display(), "Store lock acquired");
        Ok(Some(StoreLock { path }))
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Failed to remove store lock");
        } else {
            debug!(lock = %self.path.display(), "Store lock released");
        }
    }
}

fn read_owner(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn remove_lock_file(path: &Path) -> DbResult<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Unknown liveness counts as alive.
#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    pid == std::process::id() || Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}
