//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while installing telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to install the metrics recorder.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// Failed to install the log subscriber.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Failed to parse an address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::MetricsInit("failed".to_string());
        assert_eq!(err.to_string(), "Failed to initialize metrics: failed");

        let err = TelemetryError::InvalidAddress("nowhere".to_string());
        assert_eq!(err.to_string(), "Invalid address: nowhere");
    }
}
