//! Procedure invocation types.
//!
//! An [`Invocation`] describes the procedure a request resolved to. It is
//! built once when the router is assembled and shared by every call. The
//! per-request payload travels separately as an [`Input`].

use crate::error::ErrorSet;
use crate::value::Value;
use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Whether a procedure reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Side-effect free and cacheable.
    Query,
    /// Changes state.
    Mutation,
}

impl OperationKind {
    /// Returns the lowercase name used in logs and envelopes.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw octet-stream body.
#[derive(Debug, Clone, Default)]
pub struct BinaryInput {
    /// Body bytes.
    pub bytes: Bytes,
    /// `Content-Type` the client sent, if any.
    pub content_type: Option<String>,
}

/// One file part of a multipart form.
#[derive(Debug, Clone)]
pub struct FormFile {
    /// Form field the file was sent under.
    pub field: String,
    /// Client-side file name.
    pub file_name: Option<String>,
    /// Declared MIME type.
    pub content_type: Option<String>,
    /// File contents.
    pub bytes: Bytes,
}

/// A parsed multipart form.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    /// Text fields in arrival order.
    pub fields: IndexMap<String, String>,
    /// File parts in arrival order.
    pub files: Vec<FormFile>,
}

impl FormData {
    /// Returns a text field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Returns the first file sent under a field name.
    pub fn file(&self, field: &str) -> Option<&FormFile> {
        self.files.iter().find(|f| f.field == field)
    }
}

/// The per-request payload of a procedure call.
#[derive(Debug, Clone)]
pub enum Input {
    /// A JSON payload, already decoded by the layer's transformer.
    Json(Value),
    /// An unbatched octet-stream body.
    Binary(BinaryInput),
    /// An unbatched multipart form.
    Form(FormData),
}

impl Input {
    /// An empty JSON input.
    pub const fn none() -> Self {
        Self::Json(Value::Null)
    }

    /// Short name of the payload shape, for logs.
    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Binary(_) => "binary",
            Self::Form(_) => "form",
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::none()
    }
}

/// What middleware knows about the procedure being called.
#[derive(Debug, Clone)]
pub struct Invocation {
    path: String,
    kind: OperationKind,
    errors: Arc<ErrorSet>,
}

impl Invocation {
    /// Creates an invocation description.
    pub fn new(path: impl Into<String>, kind: OperationKind, errors: Arc<ErrorSet>) -> Self {
        Self {
            path: path.into(),
            kind,
            errors,
        }
    }

    /// Dot-delimited procedure path, e.g. `post.getPost`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query or mutation.
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The procedure's declared errors.
    pub fn errors(&self) -> &ErrorSet {
        &self.errors
    }
}
