//! Tests for component configuration sections.

use super::*;

fn valid_registry() -> RegistryConfig {
    RegistryConfig {
        base_url: "https://rest.example.com/WS2".to_string(),
        company_id: "1234".to_string(),
        auth_token: "token-value".to_string(),
        timeout_seconds: 10,
    }
}

#[test]
fn test_worker_defaults() {
    let config = WorkerConfig::default();

    assert_eq!(config.count, 3);
    assert!(config.validate().is_ok());
}

#[test]
fn test_zero_workers_rejected() {
    let config = WorkerConfig {
        count: 0,
        ..Default::default()
    };

    assert!(matches!(
        config.validate(),
        Err(ValidationError::InvalidFormat { ref field, .. }) if field == "workers.count"
    ));
}

#[test]
fn test_gate_default_lock_file_is_in_temp_dir() {
    let config = GateConfig::default();

    assert!(config.lock_file.starts_with(std::env::temp_dir()));
    assert!(config.validate().is_ok());
}

#[test]
fn test_mapping_requires_file_path() {
    let err = MappingConfig::default().validate().unwrap_err();
    assert_eq!(
        err,
        ValidationError::Required {
            field: "mapping.file_path".to_string()
        }
    );
}

#[test]
fn test_registry_valid_config_passes() {
    assert!(valid_registry().validate().is_ok());
}

#[test]
fn test_registry_requires_token() {
    let config = RegistryConfig {
        auth_token: "  ".to_string(),
        ..valid_registry()
    };

    assert!(matches!(
        config.validate(),
        Err(ValidationError::Required { ref field }) if field == "registry.auth_token"
    ));
}

#[test]
fn test_registry_rejects_unparseable_url() {
    let config = RegistryConfig {
        base_url: "not a url".to_string(),
        ..valid_registry()
    };

    assert!(matches!(
        config.validate(),
        Err(ValidationError::InvalidFormat { .. })
    ));
}

#[test]
fn test_registry_debug_redacts_token() {
    let debug_str = format!("{:?}", valid_registry());

    assert!(!debug_str.contains("token-value"), "token leaked: {debug_str}");
    assert!(debug_str.contains("REDACTED"));
}

#[test]
fn test_repositories_defaults_use_git() {
    let config = RepositoriesConfig::default();

    assert_eq!(config.git_program, "git");
    assert!(config.validate().is_err(), "base_target_dir is required");

    let config = RepositoriesConfig {
        base_target_dir: PathBuf::from("/srv/sources"),
        ..config
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_analyzer_requires_paths() {
    let config = AnalyzerConfig {
        jar_path: PathBuf::from("/opt/analyzer/cli.jar"),
        working_dir: PathBuf::from("/tmp/analyzer"),
        ..Default::default()
    };

    assert!(matches!(
        config.validate(),
        Err(ValidationError::Required { ref field }) if field == "analyzer.home_dir"
    ));
}

#[test]
fn test_zero_timeouts_rejected() {
    let registry = RegistryConfig {
        timeout_seconds: 0,
        ..valid_registry()
    };
    let repositories = RepositoriesConfig {
        base_target_dir: PathBuf::from("/srv/sources"),
        clone_timeout_seconds: 0,
        ..Default::default()
    };
    let analyzer = AnalyzerConfig {
        jar_path: PathBuf::from("/opt/analyzer/cli.jar"),
        working_dir: PathBuf::from("/tmp/analyzer"),
        home_dir: PathBuf::from("/opt/analyzer"),
        timeout_seconds: 0,
        ..Default::default()
    };

    let rejected_field = |result: Result<(), ValidationError>| match result {
        Err(ValidationError::InvalidFormat { field, .. }) => field,
        other => panic!("expected InvalidFormat, got {other:?}"),
    };
    assert_eq!(rejected_field(registry.validate()), "registry.timeout_seconds");
    assert_eq!(
        rejected_field(repositories.validate()),
        "repositories.clone_timeout_seconds"
    );
    assert_eq!(rejected_field(analyzer.validate()), "analyzer.timeout_seconds");
}

#[test]
fn test_sections_deserialize_with_defaults() {
    let config: AnalyzerConfig = serde_json::from_value(serde_json::json!({
        "jar_path": "/opt/analyzer/cli.jar",
        "working_dir": "/tmp/analyzer",
        "home_dir": "/opt/analyzer",
    }))
    .unwrap();

    assert_eq!(config.java_program, "java");
    assert_eq!(config.timeout_seconds, 3600);
    assert!(config.secondary_runtime_dir.is_none());
    assert!(config.validate().is_ok());
}
