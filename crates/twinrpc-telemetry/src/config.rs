//! Telemetry configuration.

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;

/// Configuration for all telemetry subsystems.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Service name, attached to the startup log line.
    pub service_name: String,

    /// Logging configuration.
    pub logging: LogConfig,

    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "twinrpc".to_string(),
            logging: LogConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    logging: Option<LogConfig>,
    metrics: Option<MetricsConfig>,
}

impl TelemetryConfigBuilder {
    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, name: &str) -> Self {
        self.service_name = Some(name.to_string());
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LogConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Sets the metrics configuration.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the configuration, filling gaps with defaults.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();
        TelemetryConfig {
            service_name: self.service_name.unwrap_or(defaults.service_name),
            logging: self.logging.unwrap_or(defaults.logging),
            metrics: self.metrics.unwrap_or(defaults.metrics),
        }
    }
}
