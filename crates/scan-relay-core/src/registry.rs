//! # Application Registry
//!
//! The analysis service keeps a registry of the applications each company
//! has declared. The resolver consults it to confirm that the application ID
//! found in the mapping table exists before any repository is touched.
//!
//! The HTTP implementation calls
//! `GET <base>/domains/{companyId}/applications` with a bearer token and
//! expects a JSON array of objects carrying an `id` field.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::RegistryConfig;

/// Source of the application IDs known to the analysis service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApplicationRegistry: Send + Sync {
    /// List every application ID registered for the configured company.
    async fn list_application_ids(&self) -> Result<Vec<i64>, RegistryError>;
}

/// Failures talking to the registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {message}")]
    Transport { message: String },

    #[error("registry returned HTTP {status}")]
    Status { status: u16 },

    #[error("registry response could not be decoded: {message}")]
    Decode { message: String },

    #[error("registry did not answer within {timeout:?}")]
    Timeout { timeout: Duration },
}

#[derive(Debug, Deserialize)]
struct ApplicationSummary {
    id: i64,
}

// ============================================================================
// HttpApplicationRegistry
// ============================================================================

/// [`ApplicationRegistry`] backed by the analysis service REST API
pub struct HttpApplicationRegistry {
    http_client: reqwest::Client,
    applications_url: Url,
    auth_token: String,
    timeout: Duration,
}

impl HttpApplicationRegistry {
    /// Build a registry client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Transport`] when the base URL cannot carry
    /// a path or the HTTP client cannot be constructed (for example when no
    /// TLS backend is available).
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let timeout = config.timeout();
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scan-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Transport {
                message: e.to_string(),
            })?;

        let applications_url = applications_url(&config.base_url, config.company_id.trim())?;

        Ok(Self {
            http_client,
            applications_url,
            auth_token: config.auth_token.clone(),
            timeout,
        })
    }

    pub fn applications_url(&self) -> &Url {
        &self.applications_url
    }

    fn classify(&self, error: reqwest::Error) -> RegistryError {
        if error.is_timeout() {
            RegistryError::Timeout {
                timeout: self.timeout,
            }
        } else if error.is_decode() {
            RegistryError::Decode {
                message: error.to_string(),
            }
        } else {
            RegistryError::Transport {
                message: error.to_string(),
            }
        }
    }
}

impl std::fmt::Debug for HttpApplicationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApplicationRegistry")
            .field("applications_url", &self.applications_url.as_str())
            .field("auth_token", &"<REDACTED>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `<base>/domains/<company_id>/applications`, with the company ID
/// percent-encoded as a single path segment.
fn applications_url(base_url: &str, company_id: &str) -> Result<Url, RegistryError> {
    let invalid = |message: String| RegistryError::Transport { message };

    let mut url = Url::parse(base_url)
        .map_err(|e| invalid(format!("invalid registry base URL '{base_url}': {e}")))?;
    url.path_segments_mut()
        .map_err(|()| invalid(format!("registry base URL '{base_url}' cannot carry a path")))?
        .pop_if_empty()
        .extend(["domains", company_id, "applications"]);
    Ok(url)
}

#[async_trait]
impl ApplicationRegistry for HttpApplicationRegistry {
    #[instrument(skip(self), fields(url = %self.applications_url))]
    async fn list_application_ids(&self) -> Result<Vec<i64>, RegistryError> {
        let response = self
            .http_client
            .get(self.applications_url.clone())
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
            });
        }

        let applications: Vec<ApplicationSummary> =
            response.json().await.map_err(|e| self.classify(e))?;

        debug!(count = applications.len(), "Fetched registered applications");
        Ok(applications.into_iter().map(|app| app.id).collect())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
