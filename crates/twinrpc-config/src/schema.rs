//! Configuration section types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// HTTP server section.
///
/// # Example
///
/// ```
/// use twinrpc_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:4000".to_string(),
///     ..ServerConfig::default()
/// };
/// assert_eq!(config.legacy_prefix, "/trpc");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Per-request deadline in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Mount point of the legacy (batched) layer.
    #[serde(default = "default_legacy_prefix")]
    pub legacy_prefix: String,

    /// Mount point of the contract layer.
    #[serde(default = "default_contract_prefix")]
    pub contract_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            legacy_prefix: default_legacy_prefix(),
            contract_prefix: default_contract_prefix(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_legacy_prefix() -> String {
    "/trpc".to_string()
}

fn default_contract_prefix() -> String {
    "/rpc".to_string()
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines (production).
    #[default]
    Json,
    /// Human-readable (development).
    Pretty,
}

/// Logging subsection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics subsection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Scrape listener address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Telemetry section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Service name.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "twinrpc".to_string()
}

/// Security section.
///
/// The legacy layer rejects anonymous calls to protected procedures by
/// default; the contract layer only logs them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Reject protected legacy calls without an identity cookie.
    #[serde(default = "default_true")]
    pub enforce_legacy_auth: bool,

    /// Reject protected contract calls without an identity cookie.
    #[serde(default)]
    pub enforce_contract_auth: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enforce_legacy_auth: true,
            enforce_contract_auth: false,
        }
    }
}

/// Quota (rate limiting) section. Off unless enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Install the in-memory limiter.
    #[serde(default)]
    pub enabled: bool,

    /// Calls per window and client.
    #[serde(default = "default_quota_limit")]
    pub limit: u64,

    /// Window length in seconds.
    #[serde(default = "default_quota_window")]
    pub window_secs: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: default_quota_limit(),
            window_secs: default_quota_window(),
        }
    }
}

fn default_quota_limit() -> u64 {
    100
}

fn default_quota_window() -> u64 {
    60
}

/// Upload storage section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UploadsConfig {
    /// Directory uploaded files are written under.
    #[serde(default = "default_uploads_root")]
    pub root: PathBuf,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            root: default_uploads_root(),
        }
    }
}

fn default_uploads_root() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, "0.0.0.0:4000");
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.contract_prefix, "/rpc");
    }

    #[test]
    fn test_security_defaults_differ_per_layer() {
        let config = SecurityConfig::default();
        assert!(config.enforce_legacy_auth);
        assert!(!config.enforce_contract_auth);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let quota: QuotaConfig = toml::from_str("enabled = true").unwrap();
        assert!(quota.enabled);
        assert_eq!(quota.limit, 100);
        assert_eq!(quota.window_secs, 60);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<QuotaConfig, _> = toml::from_str("burst = 5");
        assert!(result.is_err());
    }

    #[test]
    fn test_log_format_lowercase() {
        let logging: LoggingConfig = serde_json::from_str(r#"{"format": "pretty"}"#).unwrap();
        assert_eq!(logging.format, LogFormat::Pretty);
    }
}
