//! Prometheus metrics.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `twinrpc_http_requests_total` | Counter | `layer`, `status` |
//! | `twinrpc_http_request_duration_seconds` | Histogram | `layer` |
//! | `twinrpc_in_flight_requests` | Gauge | - |
//! | `twinrpc_procedure_calls_total` | Counter | `path`, `outcome` |
//! | `twinrpc_procedure_duration_seconds` | Histogram | `path` |
//!
//! The procedure metrics are emitted by the logging middleware; the HTTP
//! metrics by the server.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Whether to install the exporter.
    pub enabled: bool,

    /// Address of the Prometheus scrape listener.
    pub addr: String,

    /// Bucket boundaries for the duration histograms, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime when enabled.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address and
/// `TelemetryError::MetricsInit` if the recorder cannot be installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    register_metric_descriptions();
    tracing::info!(addr = %addr, "prometheus exporter listening");
    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!(
        "twinrpc_http_requests_total",
        "Total number of HTTP requests by transport layer and status"
    );
    describe_histogram!(
        "twinrpc_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "twinrpc_in_flight_requests",
        "Number of HTTP requests currently being processed"
    );
    describe_counter!(
        "twinrpc_procedure_calls_total",
        "Total number of procedure calls by path and outcome"
    );
    describe_histogram!(
        "twinrpc_procedure_duration_seconds",
        "Procedure call duration in seconds"
    );
}

/// Records one completed HTTP request.
pub fn record_http_request(layer: &'static str, status_code: u16, duration: Duration) {
    counter!(
        "twinrpc_http_requests_total",
        "layer" => layer,
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!("twinrpc_http_request_duration_seconds", "layer" => layer)
        .record(duration.as_secs_f64());
}

/// Keeps `twinrpc_in_flight_requests` raised while alive.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!("twinrpc_in_flight_requests").increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!("twinrpc_in_flight_requests").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_disabled() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.duration_buckets.len(), 12);
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_invalid_address_is_rejected_before_install() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-address".to_string(),
            ..MetricsConfig::default()
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        record_http_request("legacy", 200, Duration::from_millis(3));
        let guard = InFlightGuard::new();
        drop(guard);
    }
}
