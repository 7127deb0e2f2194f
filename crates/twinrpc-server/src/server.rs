//! HTTP server implementation.
//!
//! The server consists of:
//!
//! - A TCP listener bound to the configured address
//! - One HTTP/1.1 connection task per accepted socket
//! - Dispatch through [`App::handle`]
//! - Graceful shutdown: stop accepting, let running calls on both layers
//!   finish, then exit once drained or after the configured timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use twinrpc_server::{App, Server, ServerConfig};
//!
//! let app = App::new(ServerConfig::default(), legacy_router, contract_router);
//! Server::new(app).run().await?;
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};

use crate::app::App;
use crate::error::ServerError;
use crate::shutdown::{Activity, ShutdownSignal};

/// The twinrpc HTTP server.
#[derive(Debug, Clone)]
pub struct Server {
    app: Arc<App>,
}

impl Server {
    /// Wraps an app.
    pub fn new(app: App) -> Self {
        Self { app: Arc::new(app) }
    }

    /// The served app.
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Binds the configured address and serves until SIGTERM or SIGINT.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and serves until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let config = self.app.config();
        let addr = config
            .socket_addr()
            .map_err(|e| ServerError::InvalidAddress {
                addr: config.http_addr().to_string(),
                reason: e.to_string(),
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        self.serve(listener, shutdown).await
    }

    /// Serves an already bound listener until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's address cannot be read.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        tracing::info!(
            addr = %local,
            legacy = self.app.config().legacy_prefix(),
            contract = self.app.config().contract_prefix(),
            "server listening"
        );

        let drain = self.app.drain().clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let app = Arc::clone(&self.app);
                            let socket = drain.track(Activity::Connection);
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(app, stream, remote_addr, shutdown).await {
                                    tracing::debug!(peer = %remote_addr, error = %e, "connection error");
                                }
                                drop(socket);
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let shutdown_timeout = self.app.config().shutdown_timeout();
        let open = drain.snapshot();
        tracing::info!(
            timeout_secs = shutdown_timeout.as_secs(),
            connections = open.connections,
            legacy_calls = open.legacy_calls,
            contract_calls = open.contract_calls,
            "draining"
        );

        tokio::select! {
            () = drain.idle() => {
                tracing::info!("drained");
            }
            () = tokio::time::sleep(shutdown_timeout) => {
                let left = drain.snapshot();
                tracing::warn!(
                    connections = left.connections,
                    legacy_calls = left.legacy_calls,
                    contract_calls = left.contract_calls,
                    "shutdown timeout reached before draining"
                );
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

async fn handle_connection(
    app: Arc<App>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let app = Arc::clone(&app);
        async move { Ok::<_, Infallible>(app.handle(req, Some(remote_addr)).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => return result,
        () = shutdown.recv() => {
            tracing::debug!(peer = %remote_addr, "closing connection after the current call");
            conn.as_mut().graceful_shutdown();
        }
    }
    conn.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerConfig;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use twinrpc_core::{ErrorSet, Value};
    use twinrpc_router::{ProcedureBuilder, ProcedureGroup, Router};

    fn server(config: ServerConfig) -> Server {
        let empty = || Router::builder().build().unwrap();
        Server::new(App::new(config, empty(), empty()))
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let config = ServerConfig::builder().http_addr("nowhere").build();
        let result = server(config).run_with_shutdown(ShutdownSignal::new()).await;
        assert!(matches!(result, Err(ServerError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_serves_health_and_stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();

        let config = ServerConfig::builder()
            .shutdown_timeout(Duration::from_secs(1))
            .build();
        let handle = tokio::spawn(server(config).serve(listener, shutdown.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
        assert!(raw.contains("\"status\":\"ok\""));
        assert!(raw.to_ascii_lowercase().contains("access-control-allow-origin: *"));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server should stop")
            .expect("task should not panic")
            .expect("server should exit cleanly");
    }

    fn slow_router(delay: Duration) -> Router {
        let slow = ProcedureBuilder::new()
            .errors(ErrorSet::legacy())
            .query(move |_ctx| async move {
                tokio::time::sleep(delay).await;
                Ok(Value::from("done"))
            });
        Router::builder()
            .merge("demo", ProcedureGroup::new().procedure("slow", slow))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_running_call_finishes_after_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownSignal::new();

        let config = ServerConfig::builder()
            .shutdown_timeout(Duration::from_secs(2))
            .build();
        let empty = Router::builder().build().unwrap();
        let server = Server::new(App::new(config, slow_router(Duration::from_millis(200)), empty));
        let drain = server.app().drain().clone();
        let handle = tokio::spawn(server.serve(listener, shutdown.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /trpc/slow HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while drain.snapshot().legacy_calls == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("call should start");
        shutdown.trigger();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
        assert!(raw.contains("done"), "{raw}");

        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("server should stop")
            .expect("task should not panic")
            .expect("server should exit cleanly");
        assert!(drain.snapshot().is_idle());
    }
}
