//! # twinrpc demo
//!
//! A small blog backend served over both twinrpc transports at once:
//!
//! - `user` group: `getUser`, `getAllUsers`, `updateUser`, `createUser`,
//!   `uploadAvatar`
//! - `post` group: `getPost`, `getPosts` (protected), `createPost`,
//!   `toggleLike`, `getPopularTags` and five upload procedures (base64,
//!   multipart form, raw octet stream)
//!
//! Records live in in-memory repositories seeded with two users and two
//! posts. Uploaded files are written below the configured uploads root and
//! served back under `/uploads`.
//!
//! ```rust,ignore
//! let config = twinrpc_config::ConfigLoader::new().load()?;
//! let app = twinrpc_demo::build_app(&config, Services::seeded(FileStore::new(&config.uploads.root)))?;
//! twinrpc_server::Server::new(app).run().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/twinrpc-demo/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod layers;
pub mod procedures;
pub mod records;
pub mod store;
pub mod uploads;

use std::time::Duration;

use twinrpc_config::AppConfig;
use twinrpc_router::RouterError;
use twinrpc_server::{App, HealthCheck, ServerConfig};

pub use procedures::Services;
pub use uploads::FileStore;

/// Service version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Feature list shown on the index page.
pub const FEATURES: [&str; 5] = [
    "Complex data types (Date, Map, Set)",
    "Batched calls on both transports",
    "Declared errors with status and payload",
    "File uploads (base64, multipart, octet stream)",
    "Cookie identity with per-transport authorization",
];

/// Maps the server section onto the server's own configuration.
pub fn server_config(config: &AppConfig) -> ServerConfig {
    let server = &config.server;
    ServerConfig::builder()
        .http_addr(server.http_addr.clone())
        .shutdown_timeout(Duration::from_secs(server.shutdown_timeout_secs))
        .request_timeout(Duration::from_millis(server.request_timeout_ms))
        .max_body_bytes(server.max_body_bytes)
        .legacy_prefix(server.legacy_prefix.clone())
        .contract_prefix(server.contract_prefix.clone())
        .uploads_root(config.uploads.root.clone())
        .build()
}

/// Builds the app serving `services` over both transports.
pub fn build_app(config: &AppConfig, services: Services) -> Result<App, RouterError> {
    let (legacy, contract) = layers::routers(config, &services)?;
    tracing::info!(
        legacy = legacy.len(),
        contract = contract.len(),
        "routers built"
    );

    let app = FEATURES.iter().fold(
        App::new(server_config(config), legacy, contract)
            .with_health(HealthCheck::new(&config.telemetry.service_name, VERSION)),
        |app, feature| app.with_feature(*feature),
    );
    Ok(app)
}
