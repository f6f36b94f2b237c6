//! # Repository Synchronization
//!
//! Each group owns one directory under the base target directory. A sync
//! evicts that directory entirely and re-clones every repository of the
//! group, so the analyzer always sees a fresh tree with no leftovers from
//! earlier runs.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::RepositoriesConfig;
use crate::mapping::repository_name;
use crate::process::{run_captured, ProcessError};
use crate::GroupId;

// ============================================================================
// Errors
// ============================================================================

/// Failures while preparing a group directory
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to remove {}: {source}", path.display())]
    DeletionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create {}: {source}", path.display())]
    PrepareFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot derive a directory name from repository URL '{url}'")]
    InvalidRepositoryUrl { url: String },

    #[error("repositories {first} and {second} would both be cloned into '{name}'")]
    DuplicateDirectory {
        name: String,
        first: String,
        second: String,
    },

    #[error("clone of {url} failed with status {code:?}: {stderr}")]
    CloneFailed {
        url: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to launch version-control client '{program}': {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("clone of {url} did not finish within {timeout:?}")]
    TimeoutExceeded { url: String, timeout: Duration },
}

// ============================================================================
// Version control
// ============================================================================

/// Client able to clone a remote repository into a local path
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Clone `url` into `destination`, which must not exist yet.
    async fn clone_repository(&self, url: &str, destination: &Path) -> Result<(), SyncError>;
}

/// [`VersionControl`] backed by the `git` command line client
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &RepositoriesConfig) -> Self {
        Self::new(config.git_program.clone(), config.clone_timeout())
    }
}

#[async_trait]
impl VersionControl for GitCli {
    #[instrument(skip(self), fields(destination = %destination.display()))]
    async fn clone_repository(&self, url: &str, destination: &Path) -> Result<(), SyncError> {
        let mut command = Command::new(&self.program);
        command
            .arg("clone")
            .arg(url)
            .arg(destination)
            .env("GIT_TERMINAL_PROMPT", "0");

        let output = run_captured(command, self.timeout)
            .await
            .map_err(|e| match e {
                ProcessError::Launch { program, source } => {
                    SyncError::LaunchFailure { program, source }
                }
                ProcessError::Timeout { timeout, .. } => SyncError::TimeoutExceeded {
                    url: url.to_string(),
                    timeout,
                },
            })?;

        if !output.success() {
            return Err(SyncError::CloneFailed {
                url: url.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        debug!(elapsed_ms = output.elapsed.as_millis() as u64, "Clone finished");
        Ok(())
    }
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Freshly cloned group directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronizedDirectory {
    pub group_id: GroupId,

    /// `<base>/<group_id>`
    pub root: PathBuf,

    /// One entry per cloned sibling, in clone order
    pub repositories: Vec<PathBuf>,
}

/// Evicts and re-clones group directories
#[derive(Clone)]
pub struct RepositorySynchronizer {
    vcs: Arc<dyn VersionControl>,
}

impl RepositorySynchronizer {
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self { vcs }
    }

    /// Replace `<base>/<group_id>` with fresh clones of `sibling_urls`.
    ///
    /// Clones run sequentially in the given order. When one fails the
    /// repositories cloned before it are left in place and the error is
    /// returned; the next sync of the group removes them.
    #[instrument(skip(self, sibling_urls), fields(group_id = %group_id, siblings = sibling_urls.len()))]
    pub async fn sync(
        &self,
        group_id: &GroupId,
        sibling_urls: &[String],
        base_target_directory: &Path,
    ) -> Result<SynchronizedDirectory, SyncError> {
        let started = Instant::now();
        let root = base_target_directory.join(group_id.as_str());

        let mut plan: Vec<(&str, PathBuf)> = Vec::with_capacity(sibling_urls.len());
        for url in sibling_urls {
            let name = repository_name(url)
                .ok_or_else(|| SyncError::InvalidRepositoryUrl { url: url.clone() })?;
            let destination = root.join(&name);
            if let Some((first, _)) = plan.iter().find(|(_, planned)| *planned == destination) {
                return Err(SyncError::DuplicateDirectory {
                    name,
                    first: first.to_string(),
                    second: url.clone(),
                });
            }
            plan.push((url.as_str(), destination));
        }

        remove_directory(&root).await?;
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| SyncError::PrepareFailed {
                path: root.clone(),
                source,
            })?;

        let mut repositories = Vec::with_capacity(plan.len());
        for (url, destination) in plan {
            debug!(url = %url, destination = %destination.display(), "Cloning repository");
            self.vcs.clone_repository(url, &destination).await?;
            repositories.push(destination);
        }

        info!(
            root = %root.display(),
            repositories = repositories.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Group directory synchronized"
        );

        Ok(SynchronizedDirectory {
            group_id: group_id.clone(),
            root,
            repositories,
        })
    }
}

// ============================================================================
// Directory removal
// ============================================================================

/// Remove `path` recursively; a missing directory is not an error.
async fn remove_directory(path: &Path) -> Result<(), SyncError> {
    let owned = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || remove_tree(&owned))
        .await
        .unwrap_or_else(|join_error| Err(std::io::Error::other(join_error.to_string())));

    result.map_err(|source| SyncError::DeletionFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_tree(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            warn!(path = %path.display(), "Removal denied; clearing read-only attributes and retrying");
            clear_readonly(path)?;
            std::fs::remove_dir_all(path)
        }
        Err(e) => Err(e),
    }
}

/// Make every entry below `path` writable. Symbolic links are not followed.
fn clear_readonly(path: &Path) -> std::io::Result<()> {
    let metadata = std::fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Ok(());
    }

    let mut permissions = metadata.permissions();
    if permissions.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        std::fs::set_permissions(path, permissions)?;
    }

    if metadata.is_dir() {
        for entry in std::fs::read_dir(path)? {
            clear_readonly(&entry?.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
