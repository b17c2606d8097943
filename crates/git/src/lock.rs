//! Scoped index lock.
//!
//! Held around merges that shell out to the git CLI. The lock is an OS-level
//! advisory lock (`fs2`) on `<git_dir>/index.guard`, not on git's own
//! `index.lock`: git treats an existing `index.lock` as "another git process is
//! running" and would refuse the very merge we are guarding.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use thiserror::Error;

const GUARD_FILE: &str = "index.guard";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to open index guard {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to lock index guard {path}: {source}")]
    Acquire {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Released on drop, on both success and error paths.
#[derive(Debug)]
pub struct IndexLock {
    path: PathBuf,
    file: File,
}

impl IndexLock {
    /// Block until the guard for `git_dir` is held.
    pub fn acquire(git_dir: &Path) -> Result<Self, LockError> {
        let path = git_dir.join(GUARD_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;
        file.lock_exclusive().map_err(|source| LockError::Acquire {
            path: path.clone(),
            source,
        })?;
        tracing::trace!("Acquired index guard {}", path.display());
        Ok(Self { path, file })
    }

    /// Non-blocking variant; `Ok(None)` when another holder exists.
    pub fn try_acquire(git_dir: &Path) -> Result<Option<Self>, LockError> {
        let path = git_dir.join(GUARD_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { path, file })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(source) => Err(LockError::Acquire { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release index guard {}: {e}", self.path.display());
        } else {
            tracing::trace!("Released index guard {}", self.path.display());
        }
    }
}
