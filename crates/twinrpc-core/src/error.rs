//! Error taxonomy for procedures.
//!
//! Three kinds of failure flow through the middleware chain:
//!
//! | Variant | Meaning | Boundary status |
//! |---|---|---|
//! | [`ProcedureError::Defined`] | a typed outcome the caller can recover from | declared status |
//! | [`ProcedureError::Validation`] | input failed its schema before the handler ran | `400` |
//! | [`ProcedureError::Internal`] | anything else | `500`, message withheld |
//!
//! A `Defined` error only counts as declared when its kind is part of the
//! procedure's [`ErrorSet`] *and* its payload matches the declared payload
//! schema. Otherwise [`ErrorSet::classify`] treats it as internal.

use crate::value::Value;
use http::StatusCode;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using [`ProcedureError`].
pub type ProcedureResult<T> = Result<T, ProcedureError>;

/// Well-known error kind names.
pub mod kinds {
    /// Payload `{bar: string, baz?: number}`, status 400.
    pub const FOO: &str = "FOO";
    /// Payload `{bar: string, baz?: number}`, no declared status.
    pub const BAR: &str = "BAR";
    /// Missing identity.
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    /// Identity present but not allowed.
    pub const FORBIDDEN: &str = "FORBIDDEN";
    /// Unknown record or procedure.
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// Undeclared failure.
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
    /// Quota exhausted.
    pub const TOO_MANY_REQUESTS: &str = "TOO_MANY_REQUESTS";
    /// Body over the configured limit.
    pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
    /// Malformed request or failed input validation.
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    /// Wrong HTTP method for the operation kind.
    pub const METHOD_NOT_SUPPORTED: &str = "METHOD_NOT_SUPPORTED";
    /// Request deadline exceeded.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Conflicting state.
    pub const CONFLICT: &str = "CONFLICT";
    /// Request body is not parseable.
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
}

/// Field-specific validation issues, keyed by field path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an issue for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Returns the issues recorded for a field.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Returns true if no issue was recorded.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of fields with issues.
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The error a procedure handler or middleware raises.
///
/// # Example
///
/// ```
/// use twinrpc_core::{kinds, ProcedureError, Value};
///
/// let err = ProcedureError::defined(kinds::FOO)
///     .with_data(Value::object([("bar", "baz")]));
/// assert_eq!(err.kind(), "FOO");
/// ```
#[derive(Error, Debug)]
pub enum ProcedureError {
    /// A named error kind, possibly carrying a payload.
    #[error("{kind}: {}", .message.as_deref().unwrap_or("(default message)"))]
    Defined {
        /// Error kind, e.g. `NOT_FOUND`.
        kind: String,
        /// Message overriding the definition's default.
        message: Option<String>,
        /// Structured payload.
        data: Option<Value>,
    },

    /// Input validation failed before the handler ran.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable summary.
        message: String,
        /// Field-level issues.
        issues: FieldErrors,
    },

    /// Any failure the procedure did not declare.
    #[error("Internal error: {message}")]
    Internal {
        /// Diagnostic message (not exposed to clients).
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl ProcedureError {
    /// Creates an error of the given kind with the definition's default message.
    pub fn defined(kind: impl Into<String>) -> Self {
        Self::Defined {
            kind: kind.into(),
            message: None,
            data: None,
        }
    }

    /// Creates a `NOT_FOUND` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::defined(kinds::NOT_FOUND).with_message(message)
    }

    /// Creates an `UNAUTHORIZED` error.
    pub fn unauthorized() -> Self {
        Self::defined(kinds::UNAUTHORIZED)
    }

    /// Creates a `TOO_MANY_REQUESTS` error.
    pub fn too_many_requests() -> Self {
        Self::defined(kinds::TOO_MANY_REQUESTS)
    }

    /// Creates a `BAD_REQUEST` validation error without field issues.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            issues: FieldErrors::new(),
        }
    }

    /// Creates a validation error with field issues.
    pub fn validation(message: impl Into<String>, issues: FieldErrors) -> Self {
        Self::Validation {
            message: message.into(),
            issues,
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error wrapping a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Sets the message of a `Defined` or `Validation` error.
    #[must_use]
    pub fn with_message(self, message: impl Into<String>) -> Self {
        match self {
            Self::Defined { kind, data, .. } => Self::Defined {
                kind,
                message: Some(message.into()),
                data,
            },
            Self::Validation { issues, .. } => Self::Validation {
                message: message.into(),
                issues,
            },
            other => other,
        }
    }

    /// Attaches a payload to a `Defined` error.
    #[must_use]
    pub fn with_data(self, data: impl Into<Value>) -> Self {
        match self {
            Self::Defined { kind, message, .. } => Self::Defined {
                kind,
                message,
                data: Some(data.into()),
            },
            other => other,
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::Defined { kind, .. } => kind,
            Self::Validation { .. } => kinds::BAD_REQUEST,
            Self::Internal { .. } => kinds::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true for input validation failures.
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Renders the full source chain, one cause per line.
    pub fn diagnostic(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

impl From<anyhow::Error> for ProcedureError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

type PayloadCheck = Arc<dyn Fn(&serde_json::Value) -> Result<(), String> + Send + Sync>;

/// A declared error kind: default message, optional status, optional payload
/// schema.
#[derive(Clone)]
pub struct ErrorDefinition {
    kind: String,
    message: String,
    status: Option<StatusCode>,
    payload: Option<PayloadCheck>,
}

impl ErrorDefinition {
    /// Declares an error kind with a default message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            status: None,
            payload: None,
        }
    }

    /// Sets the HTTP status the kind maps to.
    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Declares the payload schema as a deserializable type.
    ///
    /// A raised payload that fails to deserialize into `T` makes the error
    /// undeclared.
    #[must_use]
    pub fn with_payload<T: DeserializeOwned + 'static>(mut self) -> Self {
        self.payload = Some(Arc::new(|data: &serde_json::Value| {
            serde_json::from_value::<T>(data.clone())
                .map(drop)
                .map_err(|e| e.to_string())
        }));
        self
    }

    /// Returns the kind name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the default message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the declared status, if any.
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns true if this kind declares a payload schema.
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Checks a raised payload against the declared schema.
    pub fn check_payload(&self, data: Option<&Value>) -> Result<(), String> {
        match &self.payload {
            None => Ok(()),
            Some(check) => check(&data.map_or(serde_json::Value::Null, Value::to_json)),
        }
    }
}

impl fmt::Debug for ErrorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorDefinition")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("status", &self.status)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Errors raised while declaring procedures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// The same kind was declared twice in one error set.
    #[error("duplicate error kind `{0}` in error set")]
    DuplicateKind(String),
}

/// Client-facing view of an error after classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorOutcome {
    /// Whether the error is one of the procedure's declared kinds.
    pub defined: bool,
    /// Kind reported to the client.
    pub kind: String,
    /// HTTP status.
    pub status: StatusCode,
    /// Message reported to the client.
    pub message: String,
    /// Payload reported to the client.
    pub data: Option<Value>,
    /// Field-level validation issues.
    pub issues: Option<FieldErrors>,
}

impl ErrorOutcome {
    /// Builds an outcome that did not come from a procedure (routing, limits).
    pub fn transport(kind: impl Into<String>, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            defined: false,
            kind: kind.into(),
            status,
            message: message.into(),
            data: None,
            issues: None,
        }
    }

    /// The generic outcome used for anything undeclared.
    pub fn internal() -> Self {
        Self::transport(
            kinds::INTERNAL_SERVER_ERROR,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
        )
    }
}

/// The declared error kinds of a procedure.
///
/// Kinds are unique: building a set from definitions that repeat a kind fails
/// with [`DefinitionError::DuplicateKind`].
#[derive(Debug, Clone, Default)]
pub struct ErrorSet {
    definitions: IndexMap<String, ErrorDefinition>,
}

/// Payload schema shared by `FOO` and `BAR`.
#[derive(Debug, Clone, Deserialize)]
struct FooBarPayload {
    #[allow(dead_code)]
    bar: String,
    #[allow(dead_code)]
    #[serde(default)]
    baz: Option<f64>,
}

impl ErrorSet {
    /// Builds a set, rejecting duplicate kinds.
    pub fn new(
        definitions: impl IntoIterator<Item = ErrorDefinition>,
    ) -> Result<Self, DefinitionError> {
        let mut set = Self::default();
        for definition in definitions {
            set = set.with(definition)?;
        }
        Ok(set)
    }

    /// Adds one definition, rejecting a duplicate kind.
    pub fn with(mut self, definition: ErrorDefinition) -> Result<Self, DefinitionError> {
        if self.definitions.contains_key(definition.kind()) {
            return Err(DefinitionError::DuplicateKind(definition.kind));
        }
        self.definitions
            .insert(definition.kind.clone(), definition);
        Ok(self)
    }

    /// The error set shared by the contract layer's procedures.
    pub fn standard() -> Self {
        let definitions = [
            ErrorDefinition::new(kinds::FOO, "foo")
                .with_status(StatusCode::BAD_REQUEST)
                .with_payload::<FooBarPayload>(),
            ErrorDefinition::new(kinds::BAR, "bar").with_payload::<FooBarPayload>(),
            ErrorDefinition::new(kinds::UNAUTHORIZED, "Unauthorized")
                .with_status(StatusCode::UNAUTHORIZED),
            ErrorDefinition::new(kinds::FORBIDDEN, "Forbidden").with_status(StatusCode::FORBIDDEN),
            ErrorDefinition::new(kinds::NOT_FOUND, "Not Found").with_status(StatusCode::NOT_FOUND),
            ErrorDefinition::new(kinds::INTERNAL_SERVER_ERROR, "Internal Server Error")
                .with_status(StatusCode::INTERNAL_SERVER_ERROR),
            ErrorDefinition::new(kinds::TOO_MANY_REQUESTS, "Too Many Requests")
                .with_status(StatusCode::TOO_MANY_REQUESTS),
            ErrorDefinition::new(kinds::PAYLOAD_TOO_LARGE, "Payload Too Large")
                .with_status(StatusCode::PAYLOAD_TOO_LARGE),
        ];
        Self::from_trusted(definitions)
    }

    /// The JSON-RPC style code set of the legacy layer.
    pub fn legacy() -> Self {
        let definitions = [
            (kinds::BAD_REQUEST, "Bad Request", StatusCode::BAD_REQUEST),
            (kinds::UNAUTHORIZED, "Unauthorized", StatusCode::UNAUTHORIZED),
            (kinds::FORBIDDEN, "Forbidden", StatusCode::FORBIDDEN),
            (kinds::NOT_FOUND, "Not Found", StatusCode::NOT_FOUND),
            (
                kinds::METHOD_NOT_SUPPORTED,
                "Method Not Supported",
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (kinds::TIMEOUT, "Timeout", StatusCode::REQUEST_TIMEOUT),
            (kinds::CONFLICT, "Conflict", StatusCode::CONFLICT),
            (
                kinds::PAYLOAD_TOO_LARGE,
                "Payload Too Large",
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                kinds::TOO_MANY_REQUESTS,
                "Too Many Requests",
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                kinds::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ]
        .map(|(kind, message, status)| ErrorDefinition::new(kind, message).with_status(status));
        Self::from_trusted(definitions)
    }

    fn from_trusted(definitions: impl IntoIterator<Item = ErrorDefinition>) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|d| (d.kind.clone(), d))
                .collect(),
        }
    }

    /// Returns true if the kind is declared.
    pub fn contains(&self, kind: &str) -> bool {
        self.definitions.contains_key(kind)
    }

    /// Returns the definition of a kind.
    pub fn get(&self, kind: &str) -> Option<&ErrorDefinition> {
        self.definitions.get(kind)
    }

    /// Iterates over the declared kinds in declaration order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Returns the number of declared kinds.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns true if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Returns true if the error is a declared kind with a valid payload.
    pub fn is_declared(&self, error: &ProcedureError) -> bool {
        match error {
            ProcedureError::Defined { kind, data, .. } => self
                .get(kind)
                .is_some_and(|def| def.check_payload(data.as_ref()).is_ok()),
            _ => false,
        }
    }

    /// Maps an error to its client-facing outcome.
    ///
    /// Declared kinds without a status map to `500`. Undeclared kinds and
    /// payload mismatches become the generic internal outcome.
    pub fn classify(&self, error: &ProcedureError) -> ErrorOutcome {
        match error {
            ProcedureError::Defined {
                kind,
                message,
                data,
            } => match self.get(kind) {
                Some(def) => match def.check_payload(data.as_ref()) {
                    Ok(()) => ErrorOutcome {
                        defined: true,
                        kind: kind.clone(),
                        status: def.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                        message: message.clone().unwrap_or_else(|| def.message().to_string()),
                        data: data.clone(),
                        issues: None,
                    },
                    Err(reason) => {
                        tracing::warn!(kind = %kind, reason = %reason, "error payload does not match its declaration");
                        ErrorOutcome::internal()
                    }
                },
                None => ErrorOutcome::internal(),
            },
            ProcedureError::Validation { message, issues } => ErrorOutcome {
                defined: false,
                kind: kinds::BAD_REQUEST.to_string(),
                status: StatusCode::BAD_REQUEST,
                message: message.clone(),
                data: None,
                issues: Some(issues.clone()),
            },
            ProcedureError::Internal { .. } => ErrorOutcome::internal(),
        }
    }
}
