//! Server configuration types.
//!
//! # Example
//!
//! ```rust
//! use twinrpc_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .http_addr("127.0.0.1:4000")
//!     .request_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.http_addr(), "127.0.0.1:4000");
//! assert_eq!(config.legacy_prefix(), "/trpc");
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default HTTP bind address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:4000";

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default request deadline in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default body size limit (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    http_addr: String,
    shutdown_timeout: Duration,
    request_timeout: Duration,
    max_body_bytes: usize,
    legacy_prefix: String,
    contract_prefix: String,
    uploads_root: Option<PathBuf>,
}

impl ServerConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the HTTP bind address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.http_addr.parse()
    }

    /// How long shutdown waits for open connections.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Deadline for reading the body and dispatching one request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Largest accepted request body.
    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Mount point of the legacy layer.
    #[must_use]
    pub fn legacy_prefix(&self) -> &str {
        &self.legacy_prefix
    }

    /// Mount point of the contract layer.
    #[must_use]
    pub fn contract_prefix(&self) -> &str {
        &self.contract_prefix
    }

    /// Directory served under `/uploads`, if any.
    #[must_use]
    pub fn uploads_root(&self) -> Option<&Path> {
        self.uploads_root.as_deref()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    http_addr: String,
    shutdown_timeout: Duration,
    request_timeout: Duration,
    max_body_bytes: usize,
    legacy_prefix: String,
    contract_prefix: String,
    uploads_root: Option<PathBuf>,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            legacy_prefix: "/trpc".to_string(),
            contract_prefix: "/rpc".to_string(),
            uploads_root: None,
        }
    }
}

impl ServerConfigBuilder {
    /// Sets the bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Sets the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the body size limit.
    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Sets the legacy layer's mount point.
    #[must_use]
    pub fn legacy_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.legacy_prefix = prefix.into();
        self
    }

    /// Sets the contract layer's mount point.
    #[must_use]
    pub fn contract_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.contract_prefix = prefix.into();
        self
    }

    /// Serves stored uploads from a directory.
    #[must_use]
    pub fn uploads_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.uploads_root = Some(root.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            http_addr: self.http_addr,
            shutdown_timeout: self.shutdown_timeout,
            request_timeout: self.request_timeout,
            max_body_bytes: self.max_body_bytes,
            legacy_prefix: self.legacy_prefix,
            contract_prefix: self.contract_prefix,
            uploads_root: self.uploads_root,
        }
    }
}
