//! The contract transport.
//!
//! Procedures are addressed as `<prefix>/<group>/<name>`. Bodies use the
//! compact meta transformer: `{"json": .., "meta": [[code, ..path]]}`.
//!
//! Errors answer with their declared status and the body
//! `{"json": {defined, code, status, message, data}, "meta": [..]}`.
//! `POST <prefix>/__batch__` takes `[{path, input}]` and answers
//! `[{index, status, body}]` in request order.

use std::sync::Arc;

use futures_util::future::join_all;
use http::{Method, StatusCode};
use serde::Deserialize;
use twinrpc_core::{
    kinds, CompactMetaTransformer, Context, ErrorOutcome, ErrorSet, Input, OperationKind,
    Transformer, Value,
};
use twinrpc_router::{path_not_found, RouteEntry, Router};

use crate::payload::{self, BodyKind};
use crate::request::RpcRequest;
use crate::response::{self, HttpResponse};

/// Path segment reserved for batch requests.
pub const BATCH_PATH: &str = "__batch__";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchCall {
    path: String,
    #[serde(default)]
    input: serde_json::Value,
}

/// Serves the contract layer from one router.
#[derive(Debug, Clone)]
pub struct ContractLayer {
    router: Arc<Router>,
    transformer: CompactMetaTransformer,
    fallback_errors: ErrorSet,
}

impl ContractLayer {
    /// Wraps a router.
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            transformer: CompactMetaTransformer::new(),
            fallback_errors: ErrorSet::standard(),
        }
    }

    /// The router being served.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Serves one HTTP request.
    pub async fn serve(&self, request: RpcRequest) -> HttpResponse {
        if request.method == Method::POST && request.path == BATCH_PATH {
            return self.serve_batch(request).await;
        }
        if request.method != Method::GET && request.method != Method::POST {
            let outcome = ErrorOutcome::transport(
                kinds::METHOD_NOT_SUPPORTED,
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Unsupported {}-request", request.method),
            );
            return self.render_outcome(&outcome);
        }

        let (status, body) = self.serve_single(request).await;
        response::json(status, &body)
    }

    /// Renders an error that prevented dispatch.
    pub fn render_outcome(&self, outcome: &ErrorOutcome) -> HttpResponse {
        let (status, body) = self.error_body(outcome);
        response::json(status, &body)
    }

    async fn serve_single(&self, request: RpcRequest) -> (StatusCode, serde_json::Value) {
        let RpcRequest {
            method,
            path,
            query,
            content_type,
            body,
            ctx,
        } = request;

        let Some(entry) = self.router.resolve(&path) else {
            return self.error_body(&self.fallback_errors.classify(&path_not_found(&path)));
        };

        let input = if method == Method::GET {
            if entry.procedure().kind() == OperationKind::Mutation {
                return self.error_body(&ErrorOutcome::transport(
                    kinds::METHOD_NOT_SUPPORTED,
                    StatusCode::METHOD_NOT_ALLOWED,
                    format!("Unsupported GET-request to mutation procedure at path \"{path}\""),
                ));
            }
            payload::parse_query_json(query.as_deref(), "data").and_then(|raw| self.decode(raw))
        } else {
            match BodyKind::classify(content_type.as_deref()) {
                Ok(kind) if kind.is_json() => {
                    payload::parse_json(&body).and_then(|raw| self.decode(raw))
                }
                Ok(kind) => payload::read_direct(kind, body, content_type).await,
                Err(outcome) => Err(outcome),
            }
        };

        match input {
            Ok(input) => self.invoke(entry, input, ctx).await,
            Err(outcome) => self.error_body(&outcome),
        }
    }

    async fn serve_batch(&self, request: RpcRequest) -> HttpResponse {
        let calls: Vec<BatchCall> = match serde_json::from_slice(&request.body) {
            Ok(calls) => calls,
            Err(e) => {
                return self.render_outcome(&ErrorOutcome::transport(
                    kinds::BAD_REQUEST,
                    StatusCode::BAD_REQUEST,
                    format!("batch body must be an array of {{path, input}}: {e}"),
                ))
            }
        };
        tracing::debug!(calls = calls.len(), "contract batch");

        let ctx = request.ctx;
        let results = join_all(calls.into_iter().map(|call| {
            let ctx = ctx.clone();
            async move {
                match self.decode(call.input) {
                    Ok(input) => self.dispatch(&call.path, input, ctx).await,
                    Err(outcome) => self.error_body(&outcome),
                }
            }
        }))
        .await;

        let items: Vec<serde_json::Value> = results
            .into_iter()
            .enumerate()
            .map(|(index, (status, body))| {
                serde_json::json!({ "index": index, "status": status.as_u16(), "body": body })
            })
            .collect();
        response::json(StatusCode::OK, &serde_json::Value::Array(items))
    }

    async fn dispatch(&self, path: &str, input: Input, ctx: Context) -> (StatusCode, serde_json::Value) {
        let Some(entry) = self.router.resolve(path) else {
            return self.error_body(&self.fallback_errors.classify(&path_not_found(path)));
        };
        self.invoke(entry, input, ctx).await
    }

    async fn invoke(
        &self,
        entry: &RouteEntry,
        input: Input,
        ctx: Context,
    ) -> (StatusCode, serde_json::Value) {
        match entry.call(ctx, input).await {
            Ok(value) => (StatusCode::OK, self.transformer.encode(&value)),
            Err(err) => self.error_body(&entry.procedure().errors().classify(&err)),
        }
    }

    fn decode(&self, raw: serde_json::Value) -> Result<Input, ErrorOutcome> {
        self.transformer.decode(raw).map(Input::Json).map_err(|e| {
            ErrorOutcome::transport(kinds::BAD_REQUEST, StatusCode::BAD_REQUEST, e.to_string())
        })
    }

    fn error_body(&self, outcome: &ErrorOutcome) -> (StatusCode, serde_json::Value) {
        let data = match (&outcome.data, &outcome.issues) {
            (Some(data), _) => data.clone(),
            (None, Some(issues)) => {
                Value::object([("issues", Value::from_serialize(issues).unwrap_or_default())])
            }
            (None, None) => Value::Null,
        };
        let error = Value::object([
            ("defined", Value::from(outcome.defined)),
            ("code", Value::from(outcome.kind.as_str())),
            ("status", Value::from(u64::from(outcome.status.as_u16()))),
            ("message", Value::from(outcome.message.as_str())),
            ("data", data),
        ]);
        (outcome.status, self.transformer.encode(&error))
    }
}
