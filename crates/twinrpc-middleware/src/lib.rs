//! # twinrpc Middleware
//!
//! Middleware chain for twinrpc procedures.
//!
//! Every procedure owns a [`Chain`]: an ordered list of [`Middleware`]
//! folded, once, into a linked structure that ends in the procedure body.
//! Requests only walk the links.
//!
//! ```text
//! call → Logging → ErrorObservation → Quota → [Authorization] → body
//!                                                                 ↓
//! result ← Logging ← ErrorObservation ← Quota ← [Authorization] ←─┘
//! ```
//!
//! ## Standard stages
//!
//! | Stage | Middleware | Purpose |
//! |-------|------------|---------|
//! | 1 | [`LoggingMiddleware`] | `{path, duration_ms}` log line and metrics |
//! | 2 | [`ErrorObservationMiddleware`] | Report undeclared errors |
//! | 3 | [`QuotaMiddleware`] | Per-client rate limiting (off unless a limiter is set) |
//! | 4 | [`AuthorizationMiddleware`] | Require an identity token (protected procedures) |
//!
//! [`LoggingMiddleware`]: stages::LoggingMiddleware
//! [`ErrorObservationMiddleware`]: stages::ErrorObservationMiddleware
//! [`QuotaMiddleware`]: stages::QuotaMiddleware
//! [`AuthorizationMiddleware`]: stages::AuthorizationMiddleware

#![doc(html_root_url = "https://docs.rs/twinrpc-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod middleware;
pub mod stages;

pub use chain::Chain;
pub use middleware::{BoxFuture, Middleware, Next, Terminal};
