//! Context provider.
//!
//! Turns raw transport data (headers and peer address) into a [`Context`].
//! The provider has no side effects and never fails: a missing or malformed
//! cookie simply yields a context without an identity token.

use crate::context::Context;
use http::header::COOKIE;
use http::HeaderMap;
use std::net::SocketAddr;

/// Reserved cookie name carrying the identity token.
pub const ID_TOKEN_COOKIE: &str = "__id_token";

/// Extracts a cookie value from a raw `Cookie` header.
///
/// Segments are split on `;`, then on the first `=`; keys and values are
/// trimmed. Empty values count as absent.
///
/// # Example
///
/// ```
/// use twinrpc_core::extract_identity_token;
///
/// let token = extract_identity_token(Some("theme=dark; __id_token=abc123"), "__id_token");
/// assert_eq!(token.as_deref(), Some("abc123"));
/// assert!(extract_identity_token(None, "__id_token").is_none());
/// ```
pub fn extract_identity_token(cookie_header: Option<&str>, cookie_name: &str) -> Option<String> {
    cookie_header?
        .split(';')
        .filter_map(|segment| segment.split_once('='))
        .find(|(key, _)| key.trim() == cookie_name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Builds a fresh [`Context`] per request.
#[derive(Debug, Clone)]
pub struct ContextProvider {
    cookie_name: String,
}

impl Default for ContextProvider {
    fn default() -> Self {
        Self {
            cookie_name: ID_TOKEN_COOKIE.to_string(),
        }
    }
}

impl ContextProvider {
    /// Creates a provider reading the standard identity cookie.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the cookie name the identity token is read from.
    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Returns the cookie name the identity token is read from.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Builds a context from request headers and the peer address.
    ///
    /// The client IP is the first `x-forwarded-for` entry when present,
    /// otherwise the peer IP. Multiple `Cookie` headers are joined before
    /// parsing. Header values that are not valid UTF-8 are skipped.
    pub fn build(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Context {
        let mut ctx = Context::new();

        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                ctx = ctx.with_header(name.as_str(), value);
            }
        }

        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        if let Some(ip) = forwarded.or_else(|| peer.map(|addr| addr.ip().to_string())) {
            ctx = ctx.with_client_ip(ip);
        }

        let cookies: Vec<&str> = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let joined = cookies.join("; ");
        let raw = if cookies.is_empty() {
            None
        } else {
            Some(joined.as_str())
        };
        if let Some(token) = extract_identity_token(raw, &self.cookie_name) {
            ctx = ctx.with_identity_token(token);
        }

        ctx
    }
}
