//! The legacy (batched, JSON-RPC style) transport.
//!
//! | request | meaning |
//! |---------|---------|
//! | `GET <prefix>/getPost?input=<json>` | one query |
//! | `POST <prefix>/createPost` + JSON body | one mutation |
//! | `GET <prefix>/getPost,getUser?batch=1&input={"0":..,"1":..}` | batched queries |
//! | `POST <prefix>/uploadSingleFile` + octet body | one unbatched mutation |
//!
//! Inputs and outputs are path-map transformed. A success body is
//! `{"result":{"data":..}}`; an error body is `{"error":..}` where the
//! transformed error carries a numeric JSON-RPC code.

use std::sync::Arc;

use futures_util::future::join_all;
use http::{Method, StatusCode};
use twinrpc_core::{
    kinds, Context, ErrorOutcome, ErrorSet, Input, OperationKind, PathMapTransformer, Transformer,
    Value,
};
use twinrpc_router::{path_not_found, Router};

use crate::payload::{self, BodyKind};
use crate::request::RpcRequest;
use crate::response::{self, HttpResponse};

/// Numeric code carried in legacy error envelopes.
pub fn error_code(kind: &str) -> i64 {
    match kind {
        kinds::BAD_REQUEST => -32600,
        kinds::UNAUTHORIZED => -32001,
        kinds::FORBIDDEN => -32003,
        kinds::NOT_FOUND => -32004,
        kinds::METHOD_NOT_SUPPORTED => -32005,
        kinds::TIMEOUT => -32008,
        kinds::CONFLICT => -32009,
        kinds::PAYLOAD_TOO_LARGE => -32013,
        kinds::TOO_MANY_REQUESTS => -32029,
        kinds::PARSE_ERROR => -32700,
        _ => -32603,
    }
}

/// Serves the legacy layer from one router.
#[derive(Debug, Clone)]
pub struct LegacyLayer {
    router: Arc<Router>,
    transformer: PathMapTransformer,
    fallback_errors: ErrorSet,
}

impl LegacyLayer {
    /// Wraps a router.
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            transformer: PathMapTransformer::new(),
            fallback_errors: ErrorSet::legacy(),
        }
    }

    /// The router being served.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Serves one HTTP request, which may hold several calls.
    pub async fn serve(&self, request: RpcRequest) -> HttpResponse {
        let RpcRequest {
            method,
            path,
            query,
            content_type,
            body,
            ctx,
        } = request;

        let batch = payload::query_flag(query.as_deref(), "batch");
        let names: Vec<&str> = if batch {
            path.split(',').collect()
        } else {
            vec![path.as_str()]
        };

        let kind = match BodyKind::classify(content_type.as_deref()) {
            Ok(kind) => kind,
            Err(outcome) => return self.render_outcome(&outcome, &path),
        };

        let inputs = match method {
            Method::GET => match payload::parse_query_json(query.as_deref(), "input") {
                Ok(raw) => self.split_inputs(raw, names.len(), batch),
                Err(outcome) => return self.render_outcome(&outcome, &path),
            },
            Method::POST if kind.is_json() => match payload::parse_json(&body) {
                Ok(raw) => self.split_inputs(raw, names.len(), batch),
                Err(outcome) => return self.render_outcome(&outcome, &path),
            },
            Method::POST => {
                if batch {
                    let outcome = ErrorOutcome::transport(
                        kinds::BAD_REQUEST,
                        StatusCode::BAD_REQUEST,
                        "batching is only supported for JSON payloads",
                    );
                    return self.render_outcome(&outcome, &path);
                }
                vec![payload::read_direct(kind, body, content_type).await]
            }
            ref other => {
                let outcome = ErrorOutcome::transport(
                    kinds::METHOD_NOT_SUPPORTED,
                    StatusCode::METHOD_NOT_ALLOWED,
                    format!("Unsupported {other}-request"),
                );
                return self.render_outcome(&outcome, &path);
            }
        };

        let calls = names
            .iter()
            .zip(inputs)
            .map(|(name, input)| self.call_one(&method, name, input, ctx.clone()));
        let results = join_all(calls).await;

        if !batch {
            let (status, body) = results
                .into_iter()
                .next()
                .unwrap_or_else(|| self.error_body(&ErrorOutcome::internal(), &path));
            return response::json(status, &body);
        }

        let status = common_status(results.iter().map(|(status, _)| *status));
        let bodies: Vec<serde_json::Value> = results.into_iter().map(|(_, body)| body).collect();
        response::json(status, &serde_json::Value::Array(bodies))
    }

    /// Renders an error that prevented dispatch (limits, timeouts, parsing).
    pub fn render_outcome(&self, outcome: &ErrorOutcome, path: &str) -> HttpResponse {
        let (status, body) = self.error_body(outcome, path);
        response::json(status, &body)
    }

    fn split_inputs(
        &self,
        raw: serde_json::Value,
        count: usize,
        batch: bool,
    ) -> Vec<Result<Input, ErrorOutcome>> {
        if !batch {
            return vec![self.decode(raw)];
        }
        match raw {
            serde_json::Value::Object(mut by_index) => (0..count)
                .map(|i| self.decode(by_index.remove(&i.to_string()).unwrap_or_default()))
                .collect(),
            serde_json::Value::Null => (0..count)
                .map(|_| Ok(Input::none()))
                .collect(),
            _ => (0..count)
                .map(|_| {
                    Err(ErrorOutcome::transport(
                        kinds::BAD_REQUEST,
                        StatusCode::BAD_REQUEST,
                        "batch input must be an object keyed by call index",
                    ))
                })
                .collect(),
        }
    }

    fn decode(&self, raw: serde_json::Value) -> Result<Input, ErrorOutcome> {
        self.transformer.decode(raw).map(Input::Json).map_err(|e| {
            ErrorOutcome::transport(kinds::BAD_REQUEST, StatusCode::BAD_REQUEST, e.to_string())
        })
    }

    async fn call_one(
        &self,
        method: &Method,
        name: &str,
        input: Result<Input, ErrorOutcome>,
        ctx: Context,
    ) -> (StatusCode, serde_json::Value) {
        let Some(entry) = self.router.resolve(name) else {
            let outcome = self.fallback_errors.classify(&path_not_found(name));
            return self.error_body(&outcome, name);
        };

        let expected = match entry.procedure().kind() {
            OperationKind::Query => Method::GET,
            OperationKind::Mutation => Method::POST,
        };
        if *method != expected {
            let outcome = ErrorOutcome::transport(
                kinds::METHOD_NOT_SUPPORTED,
                StatusCode::METHOD_NOT_ALLOWED,
                format!(
                    "Unsupported {method}-request to {} procedure at path \"{name}\"",
                    entry.procedure().kind()
                ),
            );
            return self.error_body(&outcome, name);
        }

        let input = match input {
            Ok(input) => input,
            Err(outcome) => return self.error_body(&outcome, name),
        };

        match entry.call(ctx, input).await {
            Ok(value) => (
                StatusCode::OK,
                serde_json::json!({ "result": { "data": self.transformer.encode(&value) } }),
            ),
            Err(err) => {
                let outcome = entry.procedure().errors().classify(&err);
                self.error_body(&outcome, name)
            }
        }
    }

    fn error_body(&self, outcome: &ErrorOutcome, path: &str) -> (StatusCode, serde_json::Value) {
        let mut data = vec![
            ("code", Value::from(outcome.kind.as_str())),
            ("httpStatus", Value::from(u64::from(outcome.status.as_u16()))),
            ("path", Value::from(path)),
        ];
        if let Some(payload) = &outcome.data {
            data.push(("payload", payload.clone()));
        }
        if let Some(issues) = &outcome.issues {
            data.push(("issues", Value::from_serialize(issues).unwrap_or_default()));
        }

        let error = Value::object([
            ("message", Value::from(outcome.message.as_str())),
            ("code", Value::from(error_code(&outcome.kind))),
            ("data", Value::object(data)),
        ]);
        (
            outcome.status,
            serde_json::json!({ "error": self.transformer.encode(&error) }),
        )
    }
}

/// The shared status of a batch, or `207 Multi-Status` if calls disagree.
fn common_status(statuses: impl Iterator<Item = StatusCode>) -> StatusCode {
    let mut statuses = statuses.peekable();
    let Some(first) = statuses.peek().copied() else {
        return StatusCode::OK;
    };
    if statuses.all(|status| status == first) {
        first
    } else {
        StatusCode::MULTI_STATUS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(error_code(kinds::BAD_REQUEST), -32600);
        assert_eq!(error_code(kinds::UNAUTHORIZED), -32001);
        assert_eq!(error_code(kinds::NOT_FOUND), -32004);
        assert_eq!(error_code(kinds::TOO_MANY_REQUESTS), -32029);
        assert_eq!(error_code(kinds::PARSE_ERROR), -32700);
        assert_eq!(error_code(kinds::INTERNAL_SERVER_ERROR), -32603);
        assert_eq!(error_code("FOO"), -32603);
    }

    #[test]
    fn test_common_status() {
        let ok = [StatusCode::OK, StatusCode::OK];
        assert_eq!(common_status(ok.into_iter()), StatusCode::OK);

        let mixed = [StatusCode::OK, StatusCode::NOT_FOUND];
        assert_eq!(common_status(mixed.into_iter()), StatusCode::MULTI_STATUS);

        assert_eq!(common_status(std::iter::empty()), StatusCode::OK);
    }

    fn empty_layer() -> LegacyLayer {
        LegacyLayer::new(Arc::new(Router::builder().build().unwrap()))
    }

    #[tokio::test]
    async fn test_batch_of_unknown_paths_shares_status() {
        let request = RpcRequest::new(Method::GET, "getPost,getUser").with_query("batch=1");
        let response = empty_layer().serve(request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_multipart_without_boundary_is_bad_request() {
        let request = RpcRequest::new(Method::POST, "uploadAttachmentFormData")
            .with_body("multipart/form-data", &b"--x--"[..]);
        let response = empty_layer().serve(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_body_shape() {
        let layer = empty_layer();
        let outcome = ErrorOutcome::transport(kinds::TIMEOUT, StatusCode::REQUEST_TIMEOUT, "slow");
        let (status, body) = layer.error_body(&outcome, "getPost");

        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        let error = &body["error"]["json"];
        assert_eq!(error["message"], "slow");
        assert_eq!(error["code"], -32008);
        assert_eq!(error["data"]["code"], "TIMEOUT");
        assert_eq!(error["data"]["httpStatus"], 408);
        assert_eq!(error["data"]["path"], "getPost");
    }
}
