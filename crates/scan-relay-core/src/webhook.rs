//! # Push Event Extraction
//!
//! Extracts the minimal data the pipeline needs from a push-event payload.
//! Only the clone URL and the number of commits are read; the rest of the
//! payload is ignored and never logged.

use serde::Deserialize;
use thiserror::Error;

/// Data extracted from one authenticated webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub repository_clone_url: String,

    /// Number of commits in the push; informational only
    pub commit_count: usize,
}

/// Payload could not be turned into a [`WebhookEvent`]
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON or lacks required fields: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("repository.clone_url is empty")]
    EmptyCloneUrl,
}

#[derive(Deserialize)]
struct PushPayload {
    repository: PushRepository,
    #[serde(default)]
    commits: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct PushRepository {
    clone_url: String,
}

impl WebhookEvent {
    /// Parse a raw push payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Malformed`] when the body is not JSON or has no
    /// `repository.clone_url` string, and [`PayloadError::EmptyCloneUrl`] when
    /// that string is blank.
    pub fn from_payload(body: &[u8]) -> Result<Self, PayloadError> {
        let payload: PushPayload = serde_json::from_slice(body)?;

        let clone_url = payload.repository.clone_url.trim();
        if clone_url.is_empty() {
            return Err(PayloadError::EmptyCloneUrl);
        }

        Ok(Self {
            repository_clone_url: clone_url.to_string(),
            commit_count: payload.commits.len(),
        })
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
