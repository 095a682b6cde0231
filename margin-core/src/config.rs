//! Configuration management

use crate::error::{ErrorContext, MarginError, MarginResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Length of generated CSRF tokens
pub const DEFAULT_TOKEN_LENGTH: usize = 22;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginConfig {
    /// Language used when the logged-in user has none configured
    pub default_language: String,
    pub session: SessionConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            session: SessionConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Where session attributes are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackendKind {
    /// Isolated, non-persistent storage
    Memory,
    /// Rows in the `sessions` table
    Database,
    /// One file per session under `save_path`
    Files,
}

/// Session cookie and persistence parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub backend: SessionBackendKind,
    pub cache_limiter: String,
    /// Cookie name
    pub name: String,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub http_only: bool,
    /// Seconds a persisted session survives without being written
    pub lifetime_secs: u64,
    /// Directory for the file backend
    pub save_path: Option<PathBuf>,
    pub token_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackendKind::Memory,
            cache_limiter: "nocache".to_string(),
            name: "Margin".to_string(),
            path: "/".to_string(),
            domain: String::new(),
            secure: false,
            http_only: true,
            lifetime_secs: 86_400,
            save_path: None,
            token_length: DEFAULT_TOKEN_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://margin.db?mode=rwc".to_string(),
        }
    }
}

impl MarginConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> MarginResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MarginError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: MarginConfig = toml::from_str(&content).map_err(|e| MarginError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> MarginResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| MarginError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| MarginError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> MarginResult<()> {
        self.session.validate()?;

        if self.session.backend == SessionBackendKind::Database && self.database.url.is_empty() {
            return Err(invalid(
                "database.url must be set for the database session backend",
                "Set database.url to a sqlite connection URL",
            ));
        }

        if self.default_language.is_empty() {
            return Err(invalid(
                "default_language must not be empty",
                "Set default_language to a language code such as \"en\"",
            ));
        }

        Ok(())
    }
}

impl SessionConfig {
    pub fn validate(&self) -> MarginResult<()> {
        if self.name.trim().is_empty() {
            return Err(invalid(
                "session.name must not be empty",
                "Set session.name to the cookie name",
            ));
        }

        if self.token_length < 16 {
            return Err(invalid(
                "session.token_length must be at least 16",
                "Use the default token length of 22",
            ));
        }

        if self.backend != SessionBackendKind::Memory && self.lifetime_secs == 0 {
            return Err(invalid(
                "session.lifetime_secs must be greater than 0 for persisted sessions",
                "Set session.lifetime_secs to a positive value",
            ));
        }

        if self.backend == SessionBackendKind::Files && self.save_path.is_none() {
            return Err(invalid(
                "session.save_path must be set for the files session backend",
                "Point session.save_path at a writable directory",
            ));
        }

        Ok(())
    }
}

fn invalid(message: &str, suggestion: &str) -> MarginError {
    MarginError::Config {
        message: message.to_string(),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}
