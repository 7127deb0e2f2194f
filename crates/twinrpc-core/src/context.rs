//! Request context types.
//!
//! A [`Context`] is created fresh for every request by the
//! [`ContextProvider`](crate::ContextProvider). Middleware never mutates the
//! context it receives; it hands an extended copy to the next link instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps log lines of one request easy to
/// correlate and sort.
///
/// # Example
///
/// ```
/// use twinrpc_core::RequestId;
///
/// let id = RequestId::new();
/// println!("Request ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A user resolved from a verified identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable user identifier.
    pub id: String,
    /// Email address of the user.
    pub email: String,
}

impl UserIdentity {
    /// Creates a new user identity.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Per-request context that flows through the middleware chain and into
/// procedure handlers.
///
/// The `with_*` methods consume the context and return an extended copy,
/// which is how middleware passes an augmented context downstream.
///
/// # Example
///
/// ```
/// use twinrpc_core::{Context, UserIdentity};
///
/// let ctx = Context::new().with_identity_token("abc");
/// let ctx = ctx.with_user(UserIdentity::new("1", "john@example.com"));
/// assert_eq!(ctx.identity_token(), Some("abc"));
/// assert!(ctx.user().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    request_id: RequestId,
    /// Lowercased header names to their (UTF-8) values.
    headers: BTreeMap<String, String>,
    client_ip: Option<String>,
    identity_token: Option<String>,
    user: Option<UserIdentity>,
}

impl Context {
    /// Creates an empty context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns all captured request headers.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Returns a header value by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the client IP, if known.
    #[must_use]
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// Returns the raw identity token, if the request carried one.
    #[must_use]
    pub fn identity_token(&self) -> Option<&str> {
        self.identity_token.as_deref()
    }

    /// Returns the verified user, if any middleware resolved one.
    #[must_use]
    pub const fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    /// Returns a copy with the given header added.
    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns a copy with the client IP set.
    #[must_use]
    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Returns a copy with the identity token set.
    #[must_use]
    pub fn with_identity_token(mut self, token: impl Into<String>) -> Self {
        self.identity_token = Some(token.into());
        self
    }

    /// Returns a copy with the verified user set.
    #[must_use]
    pub fn with_user(mut self, user: UserIdentity) -> Self {
        self.user = Some(user);
        self
    }
}
