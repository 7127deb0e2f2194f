//! The root configuration type.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::{
    ConfigError, LogFormat, QuotaConfig, SecurityConfig, ServerConfig, TelemetryConfigSection,
    UploadsConfig,
};

/// Complete twinrpc service configuration.
///
/// # Example
///
/// ```
/// use twinrpc_config::AppConfig;
///
/// let config = AppConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:4000");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging and metrics settings.
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,

    /// Authorization settings.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Rate limiting settings.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Upload storage settings.
    #[serde(default)]
    pub uploads: UploadsConfig,
}

impl AppConfig {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Checks values that deserialization cannot.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than zero",
            ));
        }

        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be greater than zero",
            ));
        }

        for (field, prefix) in [
            ("server.legacy_prefix", &self.server.legacy_prefix),
            ("server.contract_prefix", &self.server.contract_prefix),
        ] {
            if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
                return Err(ConfigError::invalid_value(
                    field,
                    format!("expected a path like '/rpc', got '{prefix}'"),
                ));
            }
        }

        if self.server.legacy_prefix == self.server.contract_prefix {
            return Err(ConfigError::invalid_value(
                "server.contract_prefix",
                "must differ from server.legacy_prefix",
            ));
        }

        if self.telemetry.metrics.enabled
            && self.telemetry.metrics.addr.parse::<SocketAddr>().is_err()
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        if self.quota.enabled && (self.quota.limit == 0 || self.quota.window_secs == 0) {
            return Err(ConfigError::invalid_value(
                "quota",
                "limit and window_secs must be positive when enabled",
            ));
        }

        Ok(())
    }

    /// Local development preset: pretty debug logs.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config
    }

    /// Production preset: JSON logs, metrics on, quota on.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.metrics.enabled = true;
        config.quota.enabled = true;
        config
    }

    /// Maps the telemetry section onto the telemetry crate's types.
    pub fn telemetry_config(&self) -> twinrpc_telemetry::TelemetryConfig {
        let section = &self.telemetry;
        let logging = match section.logging.format {
            LogFormat::Json => twinrpc_telemetry::LogConfig::production(),
            LogFormat::Pretty => twinrpc_telemetry::LogConfig::development(),
        };

        twinrpc_telemetry::TelemetryConfig::builder()
            .service_name(&section.service_name)
            .logging(twinrpc_telemetry::LogConfig {
                level: section.logging.level.clone(),
                ..logging
            })
            .metrics(twinrpc_telemetry::MetricsConfig {
                enabled: section.metrics.enabled,
                addr: section.metrics.addr.clone(),
                ..twinrpc_telemetry::MetricsConfig::default()
            })
            .build()
    }
}

/// Builder for [`AppConfig`].
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Sets the server section.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    /// Sets the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Sets the security section.
    #[must_use]
    pub fn security(mut self, security: SecurityConfig) -> Self {
        self.config.security = security;
        self
    }

    /// Sets the quota section.
    #[must_use]
    pub fn quota(mut self, quota: QuotaConfig) -> Self {
        self.config.quota = quota;
        self
    }

    /// Sets the uploads section.
    #[must_use]
    pub fn uploads(mut self, uploads: UploadsConfig) -> Self {
        self.config.uploads = uploads;
        self
    }

    /// Returns the configuration without validating it.
    #[must_use]
    pub fn build(self) -> AppConfig {
        self.config
    }
}
