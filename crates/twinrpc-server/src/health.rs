//! The `/health` endpoint.
//!
//! # Example
//!
//! ```rust
//! use twinrpc_server::HealthCheck;
//!
//! let health = HealthCheck::new("twinrpc-demo", "0.1.0");
//! let status = health.status();
//! assert_eq!(status.status(), "ok");
//! assert!(status.uptime_seconds() >= 0.0);
//! ```

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of a `/health` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    status: String,
    timestamp: DateTime<Utc>,
    uptime_seconds: f64,
}

impl HealthStatus {
    /// A passing status at the current time.
    #[must_use]
    pub fn ok(uptime: Duration) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            uptime_seconds: uptime.as_secs_f64(),
        }
    }

    /// The status string.
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// When the status was taken.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Seconds since the server started, with sub-second precision.
    #[must_use]
    pub fn uptime_seconds(&self) -> f64 {
        self.uptime_seconds
    }
}

/// Liveness check.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    service: String,
    version: String,
    start_time: Instant,
}

impl HealthCheck {
    /// Starts the uptime clock.
    #[must_use]
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            start_time: Instant::now(),
        }
    }

    /// Service name, as reported in the index document.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Time since construction.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus::ok(self.uptime())
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new("twinrpc", env!("CARGO_PKG_VERSION"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_camel_case() {
        let status = HealthStatus::ok(Duration::from_millis(1500));
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["status"], "ok");
        assert_eq!(json["uptimeSeconds"], 1.5);
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_uptime_grows() {
        let health = HealthCheck::default();
        let first = health.uptime();
        std::thread::sleep(Duration::from_millis(5));
        assert!(health.uptime() > first);
        assert_eq!(health.service(), "twinrpc");
    }
}
