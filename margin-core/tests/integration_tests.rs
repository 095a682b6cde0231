//! Integration tests for margin-core infrastructure

use margin_core::{
    config_error, init_logging, not_found_error, storage_error, validation_error, LogFormat,
    LoggingConfig, MarginConfig, MarginError, SessionBackendKind,
};

#[test]
fn test_error_macros() {
    let error = not_found_error!("annotation 9", "annotations");
    match &error {
        MarginError::NotFound { resource, context } => {
            assert_eq!(resource, "annotation 9");
            assert_eq!(context.component, "annotations");
        }
        _ => panic!("Expected NotFound error"),
    }
    error.log();

    let error = validation_error!("name must not be empty", "name", "annotations");
    match &error {
        MarginError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("name")),
        _ => panic!("Expected Validation error"),
    }

    let error = config_error!("bad backend", "config");
    assert!(!error.is_storage());

    let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
    let error = storage_error!("write failed", "sqlite", source);
    assert!(std::error::Error::source(&error).is_some());
}

#[test]
fn test_logging_initialization() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        filter_directives: vec!["margin_core=debug".to_string()],
        ..LoggingConfig::default()
    };

    // A second initialization reports an error instead of panicking.
    let _ = init_logging(&config);
    assert!(init_logging(&config).is_err());
}

#[test]
fn test_log_to_file_requires_path() {
    let config = LoggingConfig {
        log_to_file: true,
        log_file_path: None,
        ..LoggingConfig::default()
    };
    assert!(init_logging(&config).is_err());
}

#[test]
fn test_config_from_toml_string() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("margin.toml");
    std::fs::write(
        &path,
        r#"
default_language = "nl"

[session]
backend = "files"
save_path = "/var/lib/margin/sessions"
secure = true

[logging]
format = "json"
"#,
    )
    .unwrap();

    let config = MarginConfig::from_file(&path).unwrap();
    assert_eq!(config.default_language, "nl");
    assert_eq!(config.session.backend, SessionBackendKind::Files);
    assert!(config.session.secure);
    assert!(config.session.http_only);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_config_rejects_missing_file() {
    let result = MarginConfig::from_file("/nonexistent/margin.toml");
    assert!(matches!(result, Err(MarginError::Config { .. })));
}
