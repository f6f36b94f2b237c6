//! # Analyzer Invocation
//!
//! The analyzer is a Java command line tool that scans a source tree and
//! uploads its findings for one application. It is launched with the
//! configured analyzer home as its working directory; the service's own
//! working directory is never changed.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, instrument, warn};

use crate::config::AnalyzerConfig;
use crate::process::{run_captured, ProcessError};

const REDACTED: &str = "<REDACTED>";

/// Result of an analyzer run that exited successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReport {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Failures running the analyzer
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("analyzer exited with {}", describe_exit(.code))]
    NonZeroExit {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("failed to launch analyzer '{program}': {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("analyzer did not finish within {timeout:?}")]
    TimeoutExceeded { timeout: Duration },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Runs an analysis of a synchronized source tree
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze `source_dir` on behalf of `application_id`.
    async fn invoke(
        &self,
        source_dir: &Path,
        application_id: i64,
    ) -> Result<InvocationReport, InvocationError>;
}

/// Render a path with forward slashes regardless of platform.
pub fn to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

// ============================================================================
// JavaAnalyzer
// ============================================================================

/// [`Analyzer`] that runs `java -jar <analyzer.jar>`
#[derive(Clone)]
pub struct JavaAnalyzer {
    config: AnalyzerConfig,
    company_id: String,
    auth_token: String,
}

impl JavaAnalyzer {
    pub fn new(
        config: AnalyzerConfig,
        company_id: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            config,
            company_id: company_id.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Arguments passed after the Java launcher.
    pub fn build_arguments(&self, source_dir: &Path, application_id: i64) -> Vec<String> {
        let mut args = vec![
            "-jar".to_string(),
            self.config.jar_path.to_string_lossy().into_owned(),
            "--workingDir".to_string(),
            self.config.working_dir.to_string_lossy().into_owned(),
            "--sourceDir".to_string(),
            to_forward_slashes(source_dir),
            "--companyId".to_string(),
            self.company_id.clone(),
            "--applicationId".to_string(),
            application_id.to_string(),
            "--tokenAuth".to_string(),
            self.auth_token.clone(),
        ];

        if let Some(runtime_dir) = &self.config.secondary_runtime_dir {
            args.push("--perlInstallDir".to_string());
            args.push(runtime_dir.to_string_lossy().into_owned());
        }
        args
    }

    /// [`Self::build_arguments`] with the auth token masked, for logging.
    pub fn redacted_arguments(&self, source_dir: &Path, application_id: i64) -> Vec<String> {
        let mut args = self.build_arguments(source_dir, application_id);
        if let Some(flag) = args.iter().position(|arg| arg == "--tokenAuth") {
            if let Some(value) = args.get_mut(flag + 1) {
                *value = REDACTED.to_string();
            }
        }
        args
    }

    fn scrub(&self, text: String) -> String {
        if self.auth_token.is_empty() {
            return text;
        }
        text.replace(&self.auth_token, REDACTED)
    }
}

impl std::fmt::Debug for JavaAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JavaAnalyzer")
            .field("config", &self.config)
            .field("company_id", &self.company_id)
            .field("auth_token", &REDACTED)
            .finish()
    }
}

#[async_trait]
impl Analyzer for JavaAnalyzer {
    #[instrument(skip(self), fields(source_dir = %source_dir.display()))]
    async fn invoke(
        &self,
        source_dir: &Path,
        application_id: i64,
    ) -> Result<InvocationReport, InvocationError> {
        info!(
            program = %self.config.java_program,
            args = ?self.redacted_arguments(source_dir, application_id),
            home = %self.config.home_dir.display(),
            "Launching analyzer"
        );

        let mut command = Command::new(&self.config.java_program);
        command
            .args(self.build_arguments(source_dir, application_id))
            .current_dir(&self.config.home_dir);

        let output = run_captured(command, self.config.timeout())
            .await
            .map_err(|e| match e {
                ProcessError::Launch { program, source } => {
                    InvocationError::LaunchFailure { program, source }
                }
                ProcessError::Timeout { timeout, .. } => {
                    InvocationError::TimeoutExceeded { timeout }
                }
            })?;

        let stdout = self.scrub(output.stdout);
        let stderr = self.scrub(output.stderr);

        match output.code {
            Some(0) => {
                info!(
                    elapsed_ms = output.elapsed.as_millis() as u64,
                    "Analyzer finished"
                );
                Ok(InvocationReport {
                    exit_code: 0,
                    stdout,
                    stderr,
                    elapsed: output.elapsed,
                })
            }
            code => {
                warn!(exit_code = ?code, "Analyzer reported failure");
                Err(InvocationError::NonZeroExit {
                    code,
                    stdout,
                    stderr,
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "analyzer_tests.rs"]
mod tests;
