//! # Scan-Relay Core
//!
//! Core business logic for the Scan-Relay analysis trigger service.
//!
//! This crate contains the ingestion-and-orchestration pipeline: webhook
//! signature verification, mapping resolution, repository synchronization,
//! analyzer invocation, the enqueue gate and the worker pool that ties the
//! stages together.
//!
//! ## Architecture
//!
//! - Business logic depends only on trait abstractions
//!   ([`mapping::MappingSource`], [`registry::ApplicationRegistry`],
//!   [`sync::VersionControl`], [`analyzer::Analyzer`], [`queue::TaskProcessor`])
//! - Subprocess and HTTP implementations are injected at startup
//! - Configuration is passed by value into constructors; there is no global state
//!
//! ## Usage
//!
//! ```rust
//! use scan_relay_core::{GroupId, TaskId};
//!
//! let group = GroupId::new("G1").unwrap();
//! let task_id = TaskId::new();
//! assert_eq!(group.as_str(), "G1");
//! assert!(!task_id.to_string().is_empty());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use uuid::Uuid;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Unique identifier for a queued analysis task
///
/// Returned to the webhook caller and attached to every log line the worker
/// emits for the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a new unique task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get string representation of task ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

/// Identifier shared by the mapping rows of one logical application
///
/// The value is opaque: numeric and textual keys are both accepted. It is
/// used verbatim as a directory name under the base target directory, so
/// path separators and parent-directory components are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    /// Create new group ID with validation
    ///
    /// # Validation Rules
    /// - Must not be empty after trimming whitespace
    /// - Must not contain `/` or `\`
    /// - Must not be `.` or `..`
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into().trim().to_string();

        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "group_id".to_string(),
            });
        }

        if value.contains('/') || value.contains('\\') {
            return Err(ValidationError::InvalidCharacters {
                field: "group_id".to_string(),
                invalid_chars: "path separators".to_string(),
            });
        }

        if value == "." || value == ".." {
            return Err(ValidationError::InvalidFormat {
                field: "group_id".to_string(),
                message: "must not be a relative path component".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Get duration since another timestamp
    pub fn duration_since(&self, other: Self) -> Duration {
        let chrono_duration = self.0.signed_duration_since(other.0);
        chrono_duration.to_std().unwrap_or_default()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Analyzer invocation for synchronized source trees
pub mod analyzer;

/// Component configuration sections
pub mod config;

/// Cross-process enqueue gate
pub mod gate;

/// Mapping table loading and repository resolution
pub mod mapping;

/// Resolve, synchronize and analyze pipeline run by the workers
pub mod pipeline;

/// Subprocess execution with captured output and timeouts
pub mod process;

/// Task queue and worker pool
pub mod queue;

/// Remote application registry used to validate application IDs
pub mod registry;

/// Webhook signature verification
pub mod signature;

/// Repository synchronization (evict and re-clone)
pub mod sync;

/// Push event payload extraction
pub mod webhook;

// Re-export key types for convenience
pub use analyzer::{Analyzer, InvocationError, InvocationReport, JavaAnalyzer};
pub use config::{
    AnalyzerConfig, GateConfig, MappingConfig, RegistryConfig, RepositoriesConfig, WorkerConfig,
};
pub use gate::{FileLockGate, GateError, GateGuard};
pub use mapping::{
    normalize_repository_url, repository_name, CsvMappingSource, MappingResolver, MappingRow,
    MappingSource, Resolution, ResolutionError,
};
pub use pipeline::{AnalysisPipeline, GroupLocks, PipelineError, PipelineReport};
pub use queue::{
    AnalysisTask, PoolStats, QueueError, StatsSnapshot, TaskProcessor, TaskQueue, WorkerPool,
};
pub use registry::{ApplicationRegistry, HttpApplicationRegistry, RegistryError};
pub use signature::{verify_signature, WebhookVerifier, SIGNATURE_HEADER};
pub use sync::{GitCli, RepositorySynchronizer, SyncError, SynchronizedDirectory, VersionControl};
pub use webhook::{PayloadError, WebhookEvent};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
