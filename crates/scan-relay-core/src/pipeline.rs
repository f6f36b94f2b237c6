//! # Analysis Pipeline
//!
//! The work a worker performs for one task: resolve the repository to its
//! group, synchronize the group directory, run the analyzer on it.
//!
//! Synchronization and analysis of one group are serialized through
//! [`GroupLocks`], so two tasks for the same group never evict or scan the
//! same directory at the same time. Tasks for different groups proceed in
//! parallel.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, instrument};

use crate::analyzer::{Analyzer, InvocationError};
use crate::mapping::{MappingResolver, ResolutionError};
use crate::queue::{AnalysisTask, TaskProcessor};
use crate::sync::{RepositorySynchronizer, SyncError};
use crate::{GroupId, TaskId};

// ============================================================================
// Errors and reports
// ============================================================================

/// Failure of one pipeline run, tagged with the stage that produced it
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("synchronization of group {group_id} failed: {source}")]
    Sync {
        group_id: GroupId,
        #[source]
        source: SyncError,
    },

    #[error("analysis of group {group_id} failed: {source}")]
    Invocation {
        group_id: GroupId,
        #[source]
        source: InvocationError,
    },

    #[error("unexpected failure: {message}")]
    Unexpected { message: String },
}

impl PipelineError {
    /// Stage name used in log lines
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "resolve",
            Self::Sync { .. } => "synchronize",
            Self::Invocation { .. } => "analyze",
            Self::Unexpected { .. } => "unexpected",
        }
    }

    /// Group the failing task belonged to, when it was known at failure time
    pub fn group_id(&self) -> Option<&GroupId> {
        match self {
            Self::Resolution(ResolutionError::MissingAppId { group_id, .. })
            | Self::Resolution(ResolutionError::InvalidAppId { group_id, .. })
            | Self::Resolution(ResolutionError::UnknownAppId { group_id, .. })
            | Self::Sync { group_id, .. }
            | Self::Invocation { group_id, .. } => Some(group_id),
            _ => None,
        }
    }
}

/// Summary of a successful pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub task_id: TaskId,
    pub group_id: GroupId,
    pub application_name: String,
    pub application_id: i64,
    pub repositories: Vec<PathBuf>,
    pub analyzer_exit_code: i32,
    pub elapsed: Duration,
}

// ============================================================================
// GroupLocks
// ============================================================================

/// Registry of per-group async mutexes
///
/// Entries nobody holds or waits on are pruned whenever a lock is taken.
#[derive(Debug, Default)]
pub struct GroupLocks {
    locks: std::sync::Mutex<HashMap<GroupId, Arc<tokio::sync::Mutex<()>>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `group_id`.
    pub async fn lock(&self, group_id: &GroupId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            locks.entry(group_id.clone()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    /// Number of groups currently tracked
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// ============================================================================
// AnalysisPipeline
// ============================================================================

/// Resolver, synchronizer and analyzer wired together
#[derive(Clone)]
pub struct AnalysisPipeline {
    resolver: MappingResolver,
    synchronizer: RepositorySynchronizer,
    analyzer: Arc<dyn Analyzer>,
    group_locks: Arc<GroupLocks>,
}

impl AnalysisPipeline {
    pub fn new(
        resolver: MappingResolver,
        synchronizer: RepositorySynchronizer,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            resolver,
            synchronizer,
            analyzer,
            group_locks: Arc::new(GroupLocks::new()),
        }
    }

    pub fn group_locks(&self) -> &GroupLocks {
        &self.group_locks
    }

    /// Run every stage for `task`, stopping at the first failure.
    #[instrument(skip(self, task), fields(task_id = %task.task_id, repository = %task.repository_url))]
    pub async fn run(&self, task: &AnalysisTask) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();

        let resolution = self.resolver.resolve(&task.repository_url).await?;
        let group_id = resolution.group_id.clone();

        let _group_guard = self.group_locks.lock(&group_id).await;
        debug!(group_id = %group_id, "Group lock acquired");

        let synchronized = self
            .synchronizer
            .sync(
                &group_id,
                &resolution.sibling_urls,
                &task.base_target_directory,
            )
            .await
            .map_err(|source| PipelineError::Sync {
                group_id: group_id.clone(),
                source,
            })?;

        let invocation = self
            .analyzer
            .invoke(&synchronized.root, resolution.external_app_id)
            .await
            .map_err(|source| PipelineError::Invocation {
                group_id: group_id.clone(),
                source,
            })?;

        Ok(PipelineReport {
            task_id: task.task_id,
            group_id,
            application_name: resolution.application_name,
            application_id: resolution.external_app_id,
            repositories: synchronized.repositories,
            analyzer_exit_code: invocation.exit_code,
            elapsed: started.elapsed(),
        })
    }
}

#[async_trait]
impl TaskProcessor for AnalysisPipeline {
    async fn process(&self, task: AnalysisTask) -> Result<PipelineReport, PipelineError> {
        self.run(&task).await
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
