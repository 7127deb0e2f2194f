//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read a configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error, including unknown fields.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error, including unknown fields.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A value failed validation.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Dotted field path.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// An environment override could not be parsed.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The `.env` file exists but could not be loaded.
    #[error("failed to load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// Unsupported file format.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),
}

impl ConfigError {
    /// Creates a file-not-found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an environment parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }
}
