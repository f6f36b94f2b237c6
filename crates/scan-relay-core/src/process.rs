//! Subprocess execution with captured output and timeouts.
//!
//! Both external collaborators (the version-control client and the analyzer)
//! are run through [`run_captured`], which captures stdout and stderr in full
//! and kills the child when the timeout expires.

use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Captured result of a finished subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Failures that prevent a subprocess from producing an exit status
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Run `command` to completion, capturing both output streams.
///
/// Stdin is closed so a child waiting for interactive input (for example a
/// credential prompt) fails instead of hanging. The child is killed when it
/// outlives `timeout`.
pub async fn run_captured(
    mut command: Command,
    timeout: Duration,
) -> Result<CommandOutput, ProcessError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let child = command.spawn().map_err(|source| ProcessError::Launch {
        program: program.clone(),
        source,
    })?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ProcessError::Launch {
            program: program.clone(),
            source,
        })?,
        Err(_) => return Err(ProcessError::Timeout { program, timeout }),
    };

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        elapsed: started.elapsed(),
    })
}

#[cfg(all(test, unix))]
#[path = "process_tests.rs"]
mod tests;
