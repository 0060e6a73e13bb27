//! Per-environment advisory locks.
//!
//! Lifecycle operations on one environment are serialized by an exclusive
//! flock on a per-name file; operations on distinct names proceed
//! independently. The lock is advisory: it is respected by every caller in
//! this crate, not enforced by the filesystem.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Held for the duration of one lifecycle operation; released on drop on
/// every exit path.
#[derive(Debug)]
pub struct EnvLock {
    _file: File,
    path: PathBuf,
}

impl EnvLock {
    /// Take the lock for `name` at `lock_path`, or fail immediately with
    /// [`Error::LockHeld`] if another operation holds it.
    pub fn acquire(lock_path: &Path, name: &str) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Never unlink a "stale" lock file before locking: a second process
        // could create a fresh file at the same path and acquire a separate
        // exclusive lock, defeating mutual exclusion.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(Error::LockHeld(name.to_string()));
        }

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }
}

impl Drop for EnvLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
