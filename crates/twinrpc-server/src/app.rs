//! Request routing across the two layers and the built-in endpoints.
//!
//! [`App::handle`] is the whole HTTP surface; [`Server`](crate::Server)
//! only feeds it connections, so tests can drive it with in-memory bodies.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use twinrpc_core::{kinds, ContextProvider, ErrorOutcome};
use twinrpc_router::Router;
use twinrpc_telemetry::{record_http_request, InFlightGuard};

use crate::config::ServerConfig;
use crate::contract::ContractLayer;
use crate::health::HealthCheck;
use crate::legacy::LegacyLayer;
use crate::request::RpcRequest;
use crate::response::{self, HttpResponse};
use crate::shutdown::{Activity, Drain};
use crate::static_files::StaticFiles;

/// Mount point of stored uploads.
pub const UPLOADS_PREFIX: &str = "/uploads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Legacy,
    Contract,
}

impl Layer {
    const fn label(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Contract => "contract",
        }
    }

    const fn activity(self) -> Activity {
        match self {
            Self::Legacy => Activity::LegacyCall,
            Self::Contract => Activity::ContractCall,
        }
    }
}

/// Both RPC layers plus health, index, CORS and uploads.
#[derive(Debug)]
pub struct App {
    config: ServerConfig,
    provider: ContextProvider,
    legacy: LegacyLayer,
    contract: ContractLayer,
    health: HealthCheck,
    features: Vec<String>,
    uploads: Option<StaticFiles>,
    drain: Drain,
}

impl App {
    /// Serves `legacy` under the legacy prefix and `contract` under the
    /// contract prefix.
    pub fn new(config: ServerConfig, legacy: Router, contract: Router) -> Self {
        let uploads = config.uploads_root().map(StaticFiles::new);
        Self {
            config,
            provider: ContextProvider::new(),
            legacy: LegacyLayer::new(Arc::new(legacy)),
            contract: ContractLayer::new(Arc::new(contract)),
            health: HealthCheck::default(),
            features: Vec::new(),
            uploads,
            drain: Drain::new(),
        }
    }

    /// Replaces the context provider.
    #[must_use]
    pub fn with_context_provider(mut self, provider: ContextProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Replaces the health check (service name and version).
    #[must_use]
    pub fn with_health(mut self, health: HealthCheck) -> Self {
        self.health = health;
        self
    }

    /// Adds a line to the index document's feature list.
    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The health check.
    pub fn health(&self) -> &HealthCheck {
        &self.health
    }

    /// Open sockets and in-flight calls.
    pub fn drain(&self) -> &Drain {
        &self.drain
    }

    /// The legacy layer.
    pub fn legacy(&self) -> &LegacyLayer {
        &self.legacy
    }

    /// The contract layer.
    pub fn contract(&self) -> &ContractLayer {
        &self.contract
    }

    /// Handles one HTTP request.
    pub async fn handle<B>(&self, request: Request<B>, peer: Option<SocketAddr>) -> HttpResponse
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let started = Instant::now();
        let _in_flight = InFlightGuard::new();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        tracing::debug!(method = %method, path = %path, "request");

        let (label, response) = if method == Method::OPTIONS {
            ("preflight", response::preflight())
        } else if let Some(rest) = strip_prefix(&path, self.config.legacy_prefix()) {
            let rest = rest.to_string();
            (
                Layer::Legacy.label(),
                self.serve_layer(Layer::Legacy, rest, request, peer).await,
            )
        } else if let Some(rest) = strip_prefix(&path, self.config.contract_prefix()) {
            let rest = rest.to_string();
            (
                Layer::Contract.label(),
                self.serve_layer(Layer::Contract, rest, request, peer).await,
            )
        } else {
            self.serve_builtin(&method, &path).await
        };

        let status = response.status();
        record_http_request(label, status.as_u16(), started.elapsed());
        tracing::debug!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "response"
        );
        response
    }

    async fn serve_builtin(&self, method: &Method, path: &str) -> (&'static str, HttpResponse) {
        match (method, path) {
            (&Method::GET, "/") => ("index", self.index()),
            (&Method::GET, "/health") => (
                "health",
                response::json(
                    StatusCode::OK,
                    &serde_json::to_value(self.health.status()).unwrap_or_default(),
                ),
            ),
            _ => match (&self.uploads, strip_prefix(path, UPLOADS_PREFIX)) {
                (Some(files), Some(rest)) => ("uploads", files.serve(rest, method).await),
                _ => ("other", response::not_found(path)),
            },
        }
    }

    async fn serve_layer<B>(
        &self,
        layer: Layer,
        path: String,
        request: Request<B>,
        peer: Option<SocketAddr>,
    ) -> HttpResponse
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let _call = self.drain.track(layer.activity());
        let ctx = self.provider.build(request.headers(), peer);
        let (parts, body) = request.into_parts();
        let limit = self.config.max_body_bytes();

        let work = async {
            let body = match Limited::new(body, limit).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    let outcome = if e.downcast_ref::<LengthLimitError>().is_some() {
                        ErrorOutcome::transport(
                            kinds::PAYLOAD_TOO_LARGE,
                            StatusCode::PAYLOAD_TOO_LARGE,
                            format!("request body exceeds {limit} bytes"),
                        )
                    } else {
                        ErrorOutcome::transport(
                            kinds::BAD_REQUEST,
                            StatusCode::BAD_REQUEST,
                            format!("failed to read request body: {e}"),
                        )
                    };
                    return self.render(layer, &outcome, &path);
                }
            };

            let request = RpcRequest {
                method: parts.method.clone(),
                path: path.trim_matches('/').to_string(),
                query: parts.uri.query().map(str::to_string),
                content_type: parts
                    .headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                body,
                ctx,
            };
            match layer {
                Layer::Legacy => self.legacy.serve(request).await,
                Layer::Contract => self.contract.serve(request).await,
            }
        };

        match tokio::time::timeout(self.config.request_timeout(), work).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(layer = layer.label(), path = %path, "request timed out");
                let outcome = ErrorOutcome::transport(
                    kinds::TIMEOUT,
                    StatusCode::REQUEST_TIMEOUT,
                    "Request timed out",
                );
                self.render(layer, &outcome, &path)
            }
        }
    }

    fn render(&self, layer: Layer, outcome: &ErrorOutcome, path: &str) -> HttpResponse {
        match layer {
            Layer::Legacy => self.legacy.render_outcome(outcome, path.trim_matches('/')),
            Layer::Contract => self.contract.render_outcome(outcome),
        }
    }

    fn index(&self) -> HttpResponse {
        let body = serde_json::json!({
            "message": format!("{} API server", self.health.service()),
            "version": self.health.version(),
            "endpoints": {
                "legacy": self.config.legacy_prefix(),
                "contract": self.config.contract_prefix(),
                "health": "/health",
                "uploads": UPLOADS_PREFIX,
            },
            "features": self.features,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        response::json(StatusCode::OK, &body)
    }
}

/// Returns the part of `path` below `prefix`, or `None` if it is not below it.
fn strip_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    match path.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => Some(rest),
        _ => None,
    }
}
