//! # twinrpc
//!
//! **Typed procedures served over two RPC transports**
//!
//! twinrpc lets one set of procedures be reached through:
//!
//! - **Legacy layer** (`/trpc`) - JSON-RPC style envelopes, comma-batched
//!   calls and path-map type annotations
//! - **Contract layer** (`/rpc`) - declared error kinds with status and
//!   payload, index-ordered batches and compact type annotations
//!
//! Dates, sets and maps survive both wires intact.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use twinrpc::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let base = ProcedureBuilder::new().use_middleware(LoggingMiddleware::new());
//!     let users = ProcedureGroup::new().procedure(
//!         "ping",
//!         base.query(|_ctx| async { Ok(Value::from("pong")) }),
//!     );
//!     let router = || Router::builder().merge("user", users.clone()).build();
//!
//!     let app = App::new(ServerConfig::default(), router()?, router()?);
//!     Server::new(app).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! HTTP → App ─┬─ /trpc → LegacyLayer ──┐
//!             └─ /rpc  → ContractLayer ┴→ Router → Chain (middleware…) → handler
//! ```

#![doc(html_root_url = "https://docs.rs/twinrpc/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use twinrpc_core as core;

// Re-export server types
pub use twinrpc_server as server;

// Re-export middleware types
pub use twinrpc_middleware as middleware;

// Re-export router types
pub use twinrpc_router as router;

// Re-export telemetry
pub use twinrpc_telemetry as telemetry;

// Re-export configuration
pub use twinrpc_config as config;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use twinrpc::prelude::*;
/// ```
pub mod prelude {
    pub use twinrpc_core::{
        kinds, BinaryInput, Context, ErrorDefinition, ErrorSet, FieldErrors, FormData, FormFile,
        Input, OperationKind, ProcedureError, ProcedureResult, UserIdentity, Value,
    };

    // Procedure definition
    pub use twinrpc_router::{ProcedureBuilder, ProcedureGroup, Router, Validate};

    // Middleware stages
    pub use twinrpc_middleware::stages::{
        AuthorizationMiddleware, ErrorObservationMiddleware, InMemoryRateLimiter,
        LoggingMiddleware, QuotaMiddleware,
    };
    pub use twinrpc_middleware::{BoxFuture, Middleware, Next};

    // Serving
    pub use twinrpc_server::{App, HealthCheck, Server, ServerConfig, ShutdownSignal};

    pub use twinrpc_config::{AppConfig, ConfigLoader};
    pub use twinrpc_telemetry::{init_telemetry, TelemetryConfig};
}
