//! # twinrpc Router
//!
//! Procedure definitions and the dispatch table both RPC layers share.
//!
//! - [`ProcedureBuilder`] - Clone-able base carrying middleware and declared errors
//! - [`Procedure`] - A built procedure: kind, errors, folded middleware chain
//! - [`ProcedureGroup`] - Named procedures of one domain (e.g. `user`, `post`)
//! - [`Router`] - The merged table keyed by `<group>.<name>`
//!
//! ## Example
//!
//! ```
//! use serde::Deserialize;
//! use twinrpc_core::{ErrorSet, ProcedureError, Value};
//! use twinrpc_router::{ProcedureBuilder, ProcedureGroup, Router, Validate};
//!
//! #[derive(Deserialize)]
//! struct ById {
//!     id: u64,
//! }
//! impl Validate for ById {}
//!
//! let base = ProcedureBuilder::new().errors(ErrorSet::standard());
//! let users = ProcedureGroup::new().procedure(
//!     "getUser",
//!     base.clone().input::<ById>().query(|_ctx, input| async move {
//!         if input.id == 1 {
//!             Ok(Value::from("John Doe"))
//!         } else {
//!             Err(ProcedureError::not_found(format!("User {} not found", input.id)))
//!         }
//!     }),
//! );
//!
//! let router = Router::builder().merge("user", users).build().unwrap();
//! assert!(router.resolve("user.getUser").is_some());
//! assert!(router.resolve("getUser").is_some());
//! ```

#![doc(html_root_url = "https://docs.rs/twinrpc-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod group;
mod procedure;
mod router;

pub use group::ProcedureGroup;
pub use procedure::{InputShape, Procedure, ProcedureBuilder, TypedProcedureBuilder, Validate};
pub use router::{path_not_found, RouteEntry, Router, RouterBuilder, RouterError};
