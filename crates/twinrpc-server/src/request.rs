//! The request a transport layer receives once the server has read it.

use bytes::Bytes;
use http::Method;
use twinrpc_core::Context;

/// A fully read request addressed to one transport layer.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// HTTP method.
    pub method: Method,
    /// Path below the layer's prefix, without surrounding slashes.
    pub path: String,
    /// Raw query string.
    pub query: Option<String>,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Collected body.
    pub body: Bytes,
    /// Per-request context.
    pub ctx: Context,
}

impl RpcRequest {
    /// A bodiless request, mainly for tests.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into().trim_matches('/').to_string(),
            query: None,
            content_type: None,
            body: Bytes::new(),
            ctx: Context::new(),
        }
    }

    /// Sets the query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn with_json(mut self, body: &serde_json::Value) -> Self {
        self.content_type = Some("application/json".to_string());
        self.body = Bytes::from(body.to_string());
        self
    }

    /// Sets a body of any type.
    #[must_use]
    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = body.into();
        self
    }

    /// Replaces the context.
    #[must_use]
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = ctx;
        self
    }
}
