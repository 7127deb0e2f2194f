//! # twinrpc Core
//!
//! Core types shared by both RPC layers of twinrpc.
//!
//! - [`Context`] - Per-request context carrying headers, client IP and identity token
//! - [`ContextProvider`] - Builds a [`Context`] from transport headers
//! - [`ProcedureError`] - The error a procedure (or middleware) raises
//! - [`ErrorSet`] - The declared, typed error kinds of a procedure
//! - [`Invocation`] - What middleware knows about the procedure being called
//! - [`Value`] - Tagged value able to carry dates, sets and maps
//! - [`Transformer`] - Wire codecs that round-trip [`Value`] through JSON
//! - [`from_value`] - Deserializes typed inputs from a [`Value`], keeping nested tags

#![doc(html_root_url = "https://docs.rs/twinrpc-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod de;
mod error;
mod invocation;
mod provider;
pub mod transformer;
mod value;

pub use context::{Context, RequestId, UserIdentity};
pub use de::from_value;
pub use error::{
    kinds, DefinitionError, ErrorDefinition, ErrorOutcome, ErrorSet, FieldErrors, ProcedureError,
    ProcedureResult,
};
pub use invocation::{BinaryInput, FormData, FormFile, Input, Invocation, OperationKind};
pub use provider::{extract_identity_token, ContextProvider, ID_TOKEN_COOKIE};
pub use transformer::{CompactMetaTransformer, PathMapTransformer, TransformError, Transformer};
pub use value::Value;
