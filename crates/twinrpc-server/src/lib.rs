//! # twinrpc Server
//!
//! HTTP server for twinrpc, built on Hyper and Tokio.
//!
//! - [`App`] - Routes a request to the legacy layer, the contract layer or a
//!   built-in endpoint (`/`, `/health`, `/uploads`, CORS preflight)
//! - [`LegacyLayer`] - Batched JSON-RPC style transport with path-map encoding
//! - [`ContractLayer`] - Contract-first transport with compact meta encoding
//! - [`Server`] - Accept loop with graceful shutdown
//!
//! Every layer request is bounded by a body size limit (`413`) and a
//! deadline (`408`), both rendered in the layer's own error envelope.
//!
//! ## Example
//!
//! ```rust,ignore
//! use twinrpc_server::{App, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder().http_addr("0.0.0.0:4000").build();
//!     let app = App::new(config, legacy_router, contract_router);
//!     Server::new(app).run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/twinrpc-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
pub mod config;
pub mod contract;
mod error;
pub mod health;
pub mod legacy;
pub mod payload;
mod request;
pub mod response;
mod server;
pub mod shutdown;
pub mod static_files;

pub use app::{App, UPLOADS_PREFIX};
pub use config::{ServerConfig, ServerConfigBuilder};
pub use contract::ContractLayer;
pub use error::ServerError;
pub use health::{HealthCheck, HealthStatus};
pub use legacy::LegacyLayer;
pub use request::RpcRequest;
pub use response::HttpResponse;
pub use server::Server;
pub use shutdown::{Drain, ShutdownSignal};
