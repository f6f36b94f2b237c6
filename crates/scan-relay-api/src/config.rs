//! Configuration types for the HTTP service

use scan_relay_core::{
    AnalyzerConfig, GateConfig, MappingConfig, RegistryConfig, RepositoriesConfig,
    ValidationError, WorkerConfig,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Service configuration
///
/// Loaded once at startup and passed by value into the components that need
/// it. Every section carries defaults, so only the required values (secrets,
/// paths, registry coordinates) have to be supplied.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook endpoint settings
    pub webhooks: WebhookConfig,

    /// Worker pool settings
    pub workers: WorkerConfig,

    /// Enqueue gate settings
    pub gate: GateConfig,

    /// Mapping table location
    pub mapping: MappingConfig,

    /// Application registry settings
    pub registry: RegistryConfig,

    /// Repository synchronization settings
    pub repositories: RepositoriesConfig,

    /// Analyzer CLI settings
    pub analyzer: AnalyzerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Check every section, reporting the first invalid field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.webhooks.validate()?;
        self.workers.validate()?;
        self.gate.validate()?;
        self.mapping.validate()?;
        self.registry.validate()?;
        self.repositories.validate()?;
        self.analyzer.validate()
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "server.host".to_string(),
            });
        }
        if self.max_body_size == 0 {
            return Err(ValidationError::InvalidFormat {
                field: "server.max_body_size".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// Webhook endpoint configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook endpoint path
    pub endpoint_path: String,

    /// Shared secret used to sign deliveries
    pub secret: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/webhook".to_string(),
            secret: String::new(),
        }
    }
}

impl WebhookConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.endpoint_path.starts_with('/') {
            return Err(ValidationError::InvalidFormat {
                field: "webhooks.endpoint_path".to_string(),
                message: "must start with '/'".to_string(),
            });
        }
        if self.secret.is_empty() {
            return Err(ValidationError::Required {
                field: "webhooks.secret".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("endpoint_path", &self.endpoint_path)
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
