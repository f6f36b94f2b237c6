//! Startup helpers: configuration loading, logging and pipeline wiring.

use scan_relay_api::{ConfigError, LoggingConfig, ServiceConfig};
use scan_relay_core::{
    AnalysisPipeline, CsvMappingSource, GitCli, HttpApplicationRegistry, JavaAnalyzer,
    MappingResolver, RepositorySynchronizer,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of configuration environment variables, e.g. `SR__SERVER__PORT`.
pub const ENV_PREFIX: &str = "SR";

const SYSTEM_CONFIG: &str = "/etc/scan-relay/service";
const LOCAL_CONFIG: &str = "config/service";

// ============================================================================
// Configuration
// ============================================================================

/// Load the service configuration from the standard locations.
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/scan-relay/service.yaml`
///  2. `./config/service.yaml`
///  3. `explicit`, when given (must exist; format from its extension)
///  4. Environment variables `SR__<SECTION>__<KEY>`
pub fn load_config(explicit: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    load_config_from(explicit, environment())
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

pub(crate) fn load_config_from(
    explicit: Option<&Path>,
    environment: config::Environment,
) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name(SYSTEM_CONFIG)
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name(LOCAL_CONFIG)
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let service_config: ServiceConfig = builder
        .add_source(environment)
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })?;

    service_config.validate()?;
    Ok(service_config)
}

// ============================================================================
// Logging
// ============================================================================

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(level: &str) -> String {
    ["scan_relay_service", "scan_relay_api", "scan_relay_core", "tower_http"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&logging.level)));

    let json = logging.json_format;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

// ============================================================================
// Pipeline
// ============================================================================

/// Wire the resolve, synchronize and analyze stages from configuration.
pub fn build_pipeline(config: &ServiceConfig) -> Result<AnalysisPipeline, ConfigError> {
    let registry =
        HttpApplicationRegistry::new(&config.registry).map_err(|e| ConfigError::Component {
            component: "application registry".to_string(),
            message: e.to_string(),
        })?;

    let resolver = MappingResolver::new(
        Arc::new(CsvMappingSource::new(config.mapping.file_path.clone())),
        Arc::new(registry),
    );
    let synchronizer =
        RepositorySynchronizer::new(Arc::new(GitCli::from_config(&config.repositories)));
    let analyzer = JavaAnalyzer::new(
        config.analyzer.clone(),
        config.registry.company_id.clone(),
        config.registry.auth_token.clone(),
    );

    info!(
        mapping_file = %config.mapping.file_path.display(),
        base_target_dir = %config.repositories.base_target_dir.display(),
        analyzer_jar = %config.analyzer.jar_path.display(),
        "Analysis pipeline configured"
    );

    Ok(AnalysisPipeline::new(resolver, synchronizer, Arc::new(analyzer)))
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
