//! # Install Locks
//!
//! One lock per plugin major version guards the install transaction. Two
//! invocations installing the same `name/v<major>` are rejected, not queued;
//! different majors of the same plugin never contend.
//!
//! ## Lock Managers
//!
//! | Type | Marker | Acquire |
//! |------|--------|---------|
//! | [`FileLockManager`] | `<name>.lock` file | exclusive create (`O_EXCL`) |
//! | [`MemoryLockManager`] | set entry | insert |
//!
//! The file marker is created with a single exclusive-create call, so two
//! processes can never both observe "unlocked" and both proceed.
//!
//! ## Release
//!
//! [`LockGuard`] releases on drop, so every exit path of an install
//! (success, `?` propagation, panic unwinding) removes the marker.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Advisory lock registry keyed by lock path.
pub trait LockManager: Send + Sync {
    /// Takes the lock at `path`; fails with [`Error::PluginLocked`] if held.
    fn try_lock(&self, path: &Path) -> Result<()>;

    /// Releases the lock at `path`. Releasing a free lock is not an error.
    fn unlock(&self, path: &Path) -> Result<()>;

    /// Returns true if the lock at `path` is currently held.
    fn is_locked(&self, path: &Path) -> bool;
}

/// Lock held until dropped.
pub struct LockGuard<'a> {
    manager: &'a dyn LockManager,
    path: PathBuf,
}

impl<'a> LockGuard<'a> {
    /// Acquires the lock at `path`.
    pub fn acquire(manager: &'a dyn LockManager, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        manager.try_lock(&path)?;
        debug!("Acquired lock {}", path.display());
        Ok(Self { manager, path })
    }

    /// Returns the lock path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        match self.manager.unlock(&self.path) {
            Ok(()) => debug!("Released lock {}", self.path.display()),
            Err(e) => warn!("Failed to release lock {}: {}", self.path.display(), e),
        }
    }
}

// =============================================================================
// File locks
// =============================================================================

/// Lock manager using marker files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLockManager;

impl FileLockManager {
    /// Creates a file lock manager.
    pub fn new() -> Self {
        Self
    }
}

impl LockManager for FileLockManager {
    fn try_lock(&self, path: &Path) -> Result<()> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::PluginLocked {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(Error::fs("create lock", path)(e)),
        };

        // Owner pid, for humans inspecting a stale lock.
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!("Failed to record owner in {}: {}", path.display(), e);
        }
        Ok(())
    }

    fn unlock(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::fs("remove lock", path)(e)),
        }
    }

    fn is_locked(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }
}

// =============================================================================
// In-memory locks
// =============================================================================

/// Lock manager holding locks in process memory.
#[derive(Debug, Default)]
pub struct MemoryLockManager {
    held: Mutex<HashSet<PathBuf>>,
}

impl MemoryLockManager {
    /// Creates a lock manager with no locks held.
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> Result<std::sync::MutexGuard<'_, HashSet<PathBuf>>> {
        self.held
            .lock()
            .map_err(|_| Error::Internal("lock table poisoned".to_string()))
    }
}

impl LockManager for MemoryLockManager {
    fn try_lock(&self, path: &Path) -> Result<()> {
        if !self.held()?.insert(path.to_path_buf()) {
            return Err(Error::PluginLocked {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn unlock(&self, path: &Path) -> Result<()> {
        self.held()?.remove(path);
        Ok(())
    }

    fn is_locked(&self, path: &Path) -> bool {
        self.held().is_ok_and(|held| held.contains(path))
    }
}
