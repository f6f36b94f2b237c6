//! Response bodies returned by the HTTP endpoints.

use scan_relay_core::{StatsSnapshot, TaskId, Timestamp};
use serde::Serialize;

// ============================================================================
// Response Types
// ============================================================================

/// Accepted webhook delivery
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub task_id: TaskId,
    pub status: String,
    pub message: String,
}

impl WebhookResponse {
    pub fn queued(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: "queued".to_string(),
            message: "Analysis task queued".to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: Timestamp,

    /// Worker pool counters at the time of the check
    #[serde(flatten)]
    pub workers: StatsSnapshot,
}
