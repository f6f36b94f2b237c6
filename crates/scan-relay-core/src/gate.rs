//! # Enqueue Gate
//!
//! A non-blocking, cross-process exclusive lock taken around the enqueue of
//! each webhook delivery. A delivery that finds the gate held is rejected as
//! busy instead of waiting, so overlapping deliveries are turned away rather
//! than piling up behind one another.
//!
//! The lock is an OS advisory lock on a well-known file, which makes it
//! effective across every process configured with the same path.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GateConfig;

/// Failure to operate the lock file
#[derive(Debug, Error)]
pub enum GateError {
    #[error("lock file {} is unusable: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Exclusive lock on a well-known file
#[derive(Debug, Clone)]
pub struct FileLockGate {
    path: PathBuf,
}

impl FileLockGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.lock_file.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the gate without waiting.
    ///
    /// Returns `Ok(Some(guard))` when acquired and `Ok(None)` when another
    /// holder has it. The gate is released when the guard is dropped.
    pub fn try_acquire(&self) -> Result<Option<GateGuard>, GateError> {
        let io_error = |source| GateError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(io_error)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %self.path.display(), "Gate acquired");
                Ok(Some(GateGuard {
                    file,
                    path: self.path.clone(),
                }))
            }
            Err(e) if is_contended(&e) => {
                debug!(path = %self.path.display(), "Gate busy");
                Ok(None)
            }
            Err(e) => Err(io_error(e)),
        }
    }

    /// [`try_acquire`](Self::try_acquire) on the blocking thread pool, for
    /// callers running on the async runtime.
    pub async fn try_acquire_async(&self) -> Result<Option<GateGuard>, GateError> {
        let gate = self.clone();
        tokio::task::spawn_blocking(move || gate.try_acquire())
            .await
            .map_err(|e| GateError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e.to_string()),
            })?
    }
}

fn is_contended(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Held gate; released exactly once when dropped
#[derive(Debug)]
pub struct GateGuard {
    file: File,
    path: PathBuf,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            // Closing the file descriptor below releases the lock regardless.
            warn!(path = %self.path.display(), error = %e, "Failed to unlock gate explicitly");
        }
        debug!(path = %self.path.display(), "Gate released");
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
