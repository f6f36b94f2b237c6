//! # Scan-Relay Service
//!
//! Binary entry point.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Starts the worker pool running the analysis pipeline
//! - Serves the webhook endpoint until SIGINT or SIGTERM, then drains the
//!   workers

mod bootstrap;

use clap::Parser;
use scan_relay_api::{start_server, AppState, LoggingConfig};
use scan_relay_core::WorkerPool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "scan-relay", version, about)]
struct Cli {
    /// Configuration file layered over the standard locations
    #[arg(long, env = "SR_CONFIG_FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let service_config = match bootstrap::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            bootstrap::init_tracing(&LoggingConfig::default());
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };

    bootstrap::init_tracing(&service_config.logging);
    info!(config = ?service_config, "Starting Scan-Relay Service");

    let pipeline = match bootstrap::build_pipeline(&service_config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Failed to build analysis pipeline; aborting");
            std::process::exit(3);
        }
    };

    let (queue, pool) = WorkerPool::start(&service_config.workers, Arc::new(pipeline));
    let worker_shutdown = service_config.workers.shutdown_timeout();

    // The server owns the last queue handles; once it returns the workers
    // finish what is queued and exit.
    let result = start_server(AppState::new(service_config, queue)).await;

    let stats = pool.stats();
    info!(
        pending = stats.queue_depth,
        in_flight = stats.in_flight,
        "Waiting for workers to finish"
    );
    if !pool.shutdown(worker_shutdown).await {
        warn!("Workers did not finish before the shutdown timeout");
    }

    if let Err(e) = result {
        error!(error = %e, "Server terminated with error");
        std::process::exit(e.exit_code());
    }

    info!("Scan-Relay Service stopped");
}
