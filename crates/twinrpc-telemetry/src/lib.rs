//! Observability for twinrpc services.
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter`, JSON or pretty
//! - **Metrics**: Prometheus exposition via `metrics-exporter-prometheus`
//!
//! # Example
//!
//! ```rust,ignore
//! use twinrpc_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::builder().service_name("twin-demo").build();
//!     init_telemetry(&config).expect("telemetry");
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/twinrpc-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{init_metrics, record_http_request, InFlightGuard, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Installs logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    tracing::info!(service = %config.service_name, "telemetry initialized");
    Ok(())
}
