//! The work-tree-wide advisory lock.
//!
//! Distinct from [`wt_utils::lockfile::LockFile`]'s O_CREAT|O_EXCL
//! content-write protocol (used for atomically rewriting individual control
//! files: head-ref, base-commit, the file index). This lock instead guards
//! *which process may mutate the work tree at all* for the duration of an
//! operation, via `flock(2)` on a zero-length file that never itself holds
//! content.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::WorktreeError;

/// Whether the lock is taken for reading (shared) or mutation (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// A held advisory lock on a work tree's `lock` file.
///
/// The lock is released when this value is dropped. `downgrade` moves an
/// exclusive hold to shared without a window where no lock is held at all.
pub struct WorkTreeLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl WorkTreeLock {
    /// Acquire the lock at `path` (the work tree's `lock` file), non-blocking.
    ///
    /// Creates the file if it does not exist. Returns [`WorktreeError::Busy`]
    /// if another process already holds an incompatible lock.
    pub fn acquire(path: impl AsRef<Path>, mode: LockMode) -> Result<Self, WorktreeError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;
        flock_nonblocking(&file, mode)?;
        Ok(Self { file, path, mode })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the exclusive hold down to a shared one, keeping the lock held
    /// throughout (no gap during which another process could slip in).
    pub fn downgrade(&mut self) -> Result<(), WorktreeError> {
        if self.mode == LockMode::Exclusive {
            flock_nonblocking(&self.file, LockMode::Shared)?;
            self.mode = LockMode::Shared;
        }
        Ok(())
    }
}

impl Drop for WorkTreeLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

fn flock_nonblocking(file: &File, mode: LockMode) -> Result<(), WorktreeError> {
    let op = match mode {
        LockMode::Shared => libc::LOCK_SH,
        LockMode::Exclusive => libc::LOCK_EX,
    } | libc::LOCK_NB;
    let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EWOULDBLOCK) => Err(WorktreeError::Busy),
        _ => Err(WorktreeError::Io(err)),
    }
}
