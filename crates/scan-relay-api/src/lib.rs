//! # Scan-Relay HTTP Service
//!
//! HTTP server receiving signed push webhooks and turning each authentic
//! delivery into an analysis task on the worker queue.
//!
//! This service provides:
//! - Webhook endpoint with signature validation and a busy gate
//! - Health check endpoint reporting worker pool counters

pub mod config;
pub mod errors;
pub mod responses;

pub use config::{LoggingConfig, ServerConfig, ServiceConfig, WebhookConfig};
pub use errors::{ConfigError, ServiceError, WebhookHandlerError, BUSY_RETRY_AFTER_SECONDS};
pub use responses::{HealthResponse, WebhookResponse};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use scan_relay_core::{
    AnalysisTask, FileLockGate, TaskQueue, Timestamp, WebhookEvent, WebhookVerifier,
    SIGNATURE_HEADER,
};
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub verifier: Arc<WebhookVerifier>,
    pub gate: Arc<FileLockGate>,
    pub queue: TaskQueue,
}

impl AppState {
    /// Build handler state from the loaded configuration and the producer
    /// side of the worker queue.
    pub fn new(config: ServiceConfig, queue: TaskQueue) -> Self {
        let verifier = WebhookVerifier::new(config.webhooks.secret.clone());
        let gate = FileLockGate::from_config(&config.gate);

        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            gate: Arc::new(gate),
            queue,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .route(&state.config.webhooks.endpoint_path, post(handle_webhook))
        .route("/health", get(handle_health_check))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Serve the router on an already bound listener until `shutdown` resolves.
///
/// New connections are refused as soon as the shutdown future fires.
/// In-flight requests then get `server.shutdown_timeout_seconds` to complete;
/// connections still open after that are abandoned and this returns.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let grace = state.config.server.shutdown_timeout();
    let app = create_router(state);

    let (fired, signalled) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.await;
        let _ = fired.send(());
    });
    let server = async move { server.await };
    tokio::pin!(server);

    let deadline = async move {
        match signalled.await {
            Ok(()) => tokio::time::sleep(grace).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = &mut server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        }),
        _ = deadline => {
            warn!(
                timeout_secs = grace.as_secs(),
                "Graceful shutdown timed out; abandoning open connections"
            );
            Ok(())
        }
    }
}

/// Bind the configured address and serve until SIGINT or SIGTERM.
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let address = state.config.server.bind_address();

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!(
        address = %address,
        endpoint = %state.config.webhooks.endpoint_path,
        "Starting HTTP server"
    );

    serve(listener, state, shutdown_signal()).await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires, so the
/// other signal still stops the server.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Webhook Handler
// ============================================================================

/// Handle a push webhook delivery
///
/// 1. Verify the `X-Hub-Signature` header against the raw body
/// 2. Extract the clone URL from the payload
/// 3. Take the enqueue gate without waiting; a held gate answers 503
/// 4. Enqueue the analysis task and answer 202 while the gate is still held
///
/// Cloning and analysis happen later on a worker, never on the request.
#[instrument(skip(state, headers, body), fields(body_len = body.len()))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookHandlerError> {
    let claimed = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if !state.verifier.verify(&body, claimed) {
        return Err(WebhookHandlerError::InvalidSignature);
    }

    let event = WebhookEvent::from_payload(&body)?;
    info!(
        repository_url = %event.repository_clone_url,
        commit_count = event.commit_count,
        "Received push webhook"
    );

    let Some(_guard) = state.gate.try_acquire_async().await? else {
        return Err(WebhookHandlerError::Busy {
            retry_after_seconds: BUSY_RETRY_AFTER_SECONDS,
        });
    };

    let task = AnalysisTask::new(
        event.repository_clone_url,
        state.config.repositories.base_target_dir.clone(),
    );
    let task_id = state.queue.enqueue(task)?;

    info!(
        task_id = %task_id,
        queue_depth = state.queue.depth(),
        "Analysis task queued"
    );

    Ok((StatusCode::ACCEPTED, Json(WebhookResponse::queued(task_id))).into_response())
}

// ============================================================================
// Health Check Handler
// ============================================================================

/// Liveness check with worker pool counters
///
/// Answers 503 once the workers are gone and deliveries can no longer be
/// queued.
#[instrument(skip(state))]
async fn handle_health_check(State(state): State<AppState>) -> Response {
    let healthy = !state.queue.is_closed();

    let response = HealthResponse {
        status: if healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Timestamp::now(),
        workers: state.queue.stats(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        warn!("Health check failed: task queue closed");
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response)).into_response()
}

// ============================================================================
// Middleware
// ============================================================================

/// Tags each request with a correlation ID, taken from `x-correlation-id`
/// when the caller sent one, and logs its outcome at a level matching the
/// response status.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let start = std::time::Instant::now();
    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = correlation_id.parse() {
        response.headers_mut().insert("x-correlation-id", value);
    }

    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;
    if status.is_server_error() {
        error!(%status, duration_ms, "Request failed");
    } else if status.is_client_error() {
        warn!(%status, duration_ms, "Request rejected");
    } else {
        info!(%status, duration_ms, "Request completed");
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
