//! Layered configuration loading.
//!
//! Layers apply in order, later ones overriding earlier ones:
//! 1. Built-in defaults (or a preset)
//! 2. A TOML or JSON file
//! 3. Variables from a `.env` file, merged into the process environment
//! 4. `PREFIX__SECTION__KEY` environment variables

use std::env;
use std::fs;
use std::path::Path;

use crate::{AppConfig, ConfigError, LogFormat};

/// Configuration loader.
///
/// # Example
///
/// ```no_run
/// use twinrpc_config::ConfigLoader;
///
/// # fn main() -> Result<(), twinrpc_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("twinrpc.toml")?
///     .with_dotenv()?
///     .with_env_prefix("TWINRPC")
///     .load()?;
///
/// println!("listening on {}", config.server.http_addr);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: AppConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Starts from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the development preset.
    ///
    /// ```
    /// use twinrpc_config::{ConfigLoader, LogFormat};
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = AppConfig::development();
        self
    }

    /// Starts from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = AppConfig::production();
        self
    }

    /// Loads a file; the format follows the extension (`.toml` or `.json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed or
    /// contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        self.with_string(&content, &format)
    }

    /// Loads a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in `toml` or `json` format.
    ///
    /// ```
    /// use twinrpc_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nhttp_addr = \"127.0.0.1:3000\"", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` on parse failure or an unknown format.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        // Sections absent from the document keep their serde defaults.
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        Ok(self)
    }

    /// Merges a `.env` file from the working directory into the process
    /// environment. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Enables `PREFIX__SECTION__KEY` overrides.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(mut self) -> Result<AppConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix, env::vars())?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> AppConfig {
        self.config
    }

    fn apply_env_overrides(
        &mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let mut vars: Vec<(String, String)> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with(&marker))
            .collect();
        // Deterministic order when two spellings target one field.
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let rest = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_number(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => {
                config.server.max_body_bytes = parse_number(key, value)?;
            }
            ["SERVER", "LEGACY_PREFIX"] => config.server.legacy_prefix = value.to_string(),
            ["SERVER", "CONTRACT_PREFIX"] => config.server.contract_prefix = value.to_string(),

            ["TELEMETRY", "SERVICE_NAME"] => config.telemetry.service_name = value.to_string(),
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                config.telemetry.metrics.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => config.telemetry.metrics.addr = value.to_string(),

            ["SECURITY", "ENFORCE_LEGACY_AUTH"] => {
                config.security.enforce_legacy_auth = parse_flag(key, value)?;
            }
            ["SECURITY", "ENFORCE_CONTRACT_AUTH"] => {
                config.security.enforce_contract_auth = parse_flag(key, value)?;
            }

            ["QUOTA", "ENABLED"] => config.quota.enabled = parse_flag(key, value)?,
            ["QUOTA", "LIMIT"] => config.quota.limit = parse_number(key, value)?,
            ["QUOTA", "WINDOW_SECS"] => config.quota.window_secs = parse_number(key, value)?,

            ["UPLOADS", "ROOT"] => config.uploads.root = value.into(),

            _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parses a boolean the way shells usually spell it.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
