//! Configuration sections consumed by the core components.
//!
//! Each section deserializes with serde defaults for the optional fields.
//! Required fields default to empty strings and are rejected by the
//! `validate` methods, so a missing value is reported with its key instead of
//! a generic deserialization error.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ValidationError;

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn require_path(field: &str, value: &std::path::Path) -> Result<(), ValidationError> {
    if value.as_os_str().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn require_positive(field: &str, seconds: u64) -> Result<(), ValidationError> {
    if seconds == 0 {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "must be at least one second".to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Worker pool
// ============================================================================

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of background workers draining the task queue
    pub count: usize,

    /// How long shutdown waits for in-flight tasks, in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 3,
            shutdown_timeout_seconds: 300,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "workers.count".to_string(),
                message: "at least one worker is required".to_string(),
            });
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

// ============================================================================
// Enqueue gate
// ============================================================================

/// Enqueue gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Lock file shared by every process serving the same webhook
    pub lock_file: PathBuf,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            lock_file: std::env::temp_dir().join("scan-relay.lock"),
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_path("gate.lock_file", &self.lock_file)
    }
}

// ============================================================================
// Mapping table
// ============================================================================

/// Mapping table configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// CSV file correlating repositories, groups and application IDs
    pub file_path: PathBuf,
}

impl MappingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_path("mapping.file_path", &self.file_path)
    }
}

// ============================================================================
// Application registry
// ============================================================================

/// Remote application registry configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the analysis service REST API
    pub base_url: String,

    /// Company (tenant) identifier owning the applications
    pub company_id: String,

    /// Bearer token, also passed to the analyzer as `--tokenAuth`
    pub auth_token: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            company_id: String::new(),
            auth_token: String::new(),
            timeout_seconds: 30,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("registry.base_url", &self.base_url)?;
        require("registry.company_id", &self.company_id)?;
        require("registry.auth_token", &self.auth_token)?;
        require_positive("registry.timeout_seconds", self.timeout_seconds)?;

        url::Url::parse(&self.base_url).map_err(|e| ValidationError::InvalidFormat {
            field: "registry.base_url".to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl std::fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("base_url", &self.base_url)
            .field("company_id", &self.company_id)
            .field("auth_token", &"<REDACTED>")
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

// ============================================================================
// Repository synchronization
// ============================================================================

/// Repository synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoriesConfig {
    /// Directory under which each group gets its own working tree
    pub base_target_dir: PathBuf,

    /// Version-control client executable
    pub git_program: String,

    /// Per-clone timeout in seconds
    pub clone_timeout_seconds: u64,
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        Self {
            base_target_dir: PathBuf::new(),
            git_program: "git".to_string(),
            clone_timeout_seconds: 900,
        }
    }
}

impl RepositoriesConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_path("repositories.base_target_dir", &self.base_target_dir)?;
        require("repositories.git_program", &self.git_program)?;
        require_positive("repositories.clone_timeout_seconds", self.clone_timeout_seconds)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_seconds)
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Analyzer CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Java launcher used to run the analyzer jar
    pub java_program: String,

    /// Path to the analyzer jar
    pub jar_path: PathBuf,

    /// Scratch directory handed to the analyzer as `--workingDir`
    pub working_dir: PathBuf,

    /// Directory the analyzer process runs in
    pub home_dir: PathBuf,

    /// Optional secondary language runtime passed as `--perlInstallDir`
    pub secondary_runtime_dir: Option<PathBuf>,

    /// Invocation timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            java_program: "java".to_string(),
            jar_path: PathBuf::new(),
            working_dir: PathBuf::new(),
            home_dir: PathBuf::new(),
            secondary_runtime_dir: None,
            timeout_seconds: 3600,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("analyzer.java_program", &self.java_program)?;
        require_path("analyzer.jar_path", &self.jar_path)?;
        require_path("analyzer.working_dir", &self.working_dir)?;
        require_path("analyzer.home_dir", &self.home_dir)?;
        require_positive("analyzer.timeout_seconds", self.timeout_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
