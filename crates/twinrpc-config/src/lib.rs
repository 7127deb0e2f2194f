//! Typed configuration for twinrpc services.
//!
//! - TOML and JSON configuration files
//! - `.env` files via `dotenvy`
//! - `TWINRPC__SECTION__KEY` environment overrides
//! - Strict parsing (unknown fields fail) and post-load validation
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:4000"
//! shutdown_timeout_secs = 30
//! request_timeout_ms = 30000
//! max_body_bytes = 10485760
//! legacy_prefix = "/trpc"
//! contract_prefix = "/rpc"
//!
//! [telemetry]
//! service_name = "twin-demo"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = false
//! addr = "0.0.0.0:9090"
//!
//! [security]
//! enforce_legacy_auth = true
//! enforce_contract_auth = false
//!
//! [quota]
//! enabled = false
//! limit = 100
//! window_secs = 60
//!
//! [uploads]
//! root = "uploads"
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `TWINRPC__SERVER__HTTP_ADDR=127.0.0.1:9000`
//! - `TWINRPC__TELEMETRY__LOGGING__FORMAT=pretty`
//! - `TWINRPC__QUOTA__ENABLED=true`

#![doc(html_root_url = "https://docs.rs/twinrpc-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{AppConfig, AppConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "TWINRPC";
