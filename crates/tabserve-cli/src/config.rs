//! Configuration file support for tabserve
//!
//! Supports both YAML and TOML configuration files. Command-line flags and
//! environment variables are layered on top with [`Config::merge`].
//!
//! # Example YAML configuration:
//! ```yaml
//! # Server settings
//! server:
//!   port: 8080
//!   bind: "0.0.0.0"
//!   max_body_bytes: 1048576
//!
//! # Model artifacts
//! artifacts:
//!   dir: /srv/models/breast-cancer
//!
//! # Shared-secret authentication (omit to disable)
//! auth:
//!   api_key: "change-me"
//!
//! # Logging settings
//! logging:
//!   level: info
//! ```

use crate::api::DEFAULT_MAX_BODY_BYTES;
use crate::auth;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tabserve_core::artifacts::{ArtifactPaths, DEFAULT_ARTIFACTS_DIR, MANIFEST_FILE, MODEL_FILE};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Model artifact locations
    pub artifacts: ArtifactsConfig,

    /// Authentication configuration
    pub auth: Option<AuthConfig>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Bind address
    pub bind: String,

    /// Largest accepted `/predict` body, in bytes
    pub max_body_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "0.0.0.0".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Model artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Directory holding the model and model card
    pub dir: PathBuf,

    /// Model file name, relative to `dir`
    pub model_file: String,

    /// Model card file name, relative to `dir`
    pub manifest_file: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            model_file: MODEL_FILE.to_string(),
            manifest_file: MANIFEST_FILE.to_string(),
        }
    }
}

impl ArtifactsConfig {
    pub fn paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(
            self.dir.join(&self.model_file),
            self.dir.join(&self.manifest_file),
        )
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// API key
    pub api_key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Values supplied on the command line or through the environment.
///
/// Anything set here wins over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub api_key: Option<String>,
    pub artifacts_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from a file (YAML or TOML, auto-detected by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => {
                // Try YAML first, then TOML
                Self::from_yaml(&content).or_else(|_| Self::from_toml(&content))
            }
        }
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply command-line and environment overrides
    pub fn merge(&mut self, overrides: Overrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(bind) = overrides.bind {
            self.server.bind = bind;
        }
        if let Some(dir) = overrides.artifacts_dir {
            self.artifacts.dir = dir;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if overrides.api_key.is_some() {
            self.auth = Some(AuthConfig {
                api_key: overrides.api_key,
            });
        }
    }

    /// Authentication settings for the HTTP layer
    pub fn auth_config(&self) -> auth::AuthConfig {
        auth::AuthConfig::from_optional(self.auth.as_ref().and_then(|a| a.api_key.clone()))
    }

    /// Parsed log level
    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        self.logging
            .level
            .parse()
            .map_err(|_| ConfigError::InvalidValue("logging.level", self.logging.level.clone()))
    }

    /// Create an example configuration
    pub fn example() -> Self {
        Self {
            server: ServerConfig {
                port: 8080,
                bind: "0.0.0.0".to_string(),
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            },
            artifacts: ArtifactsConfig {
                dir: PathBuf::from("/srv/models/breast-cancer"),
                ..Default::default()
            },
            auth: Some(AuthConfig {
                api_key: Some("your-api-key-here".to_string()),
            }),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Generate example YAML configuration
    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::example()).unwrap_or_default()
    }

    /// Generate example TOML configuration
    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::example()).unwrap_or_default()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
