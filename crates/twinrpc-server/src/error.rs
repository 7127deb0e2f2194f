//! Server error types.

use thiserror::Error;

/// Errors that stop the server from running.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The configured address does not parse.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// The configured address.
        addr: String,
        /// Parser message.
        reason: String,
    },

    /// The listener could not be bound.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// The address.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ServerError::InvalidAddress {
            addr: "nowhere".to_string(),
            reason: "invalid socket address syntax".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid address 'nowhere': invalid socket address syntax"
        );

        let err = ServerError::Bind {
            addr: "127.0.0.1:1".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("failed to bind to 127.0.0.1:1"));
    }
}
