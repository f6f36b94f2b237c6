//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use scan_relay_core::{GateError, PayloadError, QueueError, ValidationError};
use tracing::{error, warn};

/// Seconds a rejected sender is asked to wait before redelivering
pub const BUSY_RETRY_AFTER_SECONDS: u64 = 5;

/// Webhook handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: the delivery is not authentic
/// - `503 Service Unavailable`: another delivery holds the enqueue gate;
///   the sender should retry
/// - `500 Internal Server Error`: everything else
///
/// Error messages returned to clients are sanitized. Details are logged
/// server-side.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Signature header missing or not matching the body
    #[error("Invalid signature")]
    InvalidSignature,

    /// Another delivery is being enqueued
    #[error("Service busy. Retry after {retry_after_seconds}s")]
    Busy { retry_after_seconds: u64 },

    /// Body is not a usable push event
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] PayloadError),

    /// The enqueue gate could not be operated
    #[error("Enqueue gate unavailable: {0}")]
    GateUnavailable(#[from] GateError),

    /// Workers are gone; the service is shutting down
    #[error("Task queue unavailable: {0}")]
    QueueClosed(#[from] QueueError),
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let (status, message, retry_after) = match self {
            Self::InvalidSignature => {
                warn!("Rejected webhook with invalid signature");
                (StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            Self::Busy {
                retry_after_seconds,
            } => {
                warn!(retry_after = retry_after_seconds, "Rejected webhook: gate busy");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    self.to_string(),
                    Some(retry_after_seconds),
                )
            }
            Self::MalformedPayload(ref e) => {
                error!(error = %e, "Webhook payload could not be interpreted");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Webhook payload could not be processed.".to_string(),
                    None,
                )
            }
            Self::GateUnavailable(ref e) => {
                error!(error = %e, "Enqueue gate failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error occurred. Please try again later.".to_string(),
                    None,
                )
            }
            Self::QueueClosed(ref e) => {
                error!(error = %e, "Task queue closed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error occurred. Please try again later.".to_string(),
                    None,
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Configuration could not be loaded: {message}")]
    Load { message: String },

    #[error("Failed to initialize {component}: {message}")]
    Component { component: String, message: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
