//! Error observation middleware.
//!
//! Declared errors (and input validation failures) are expected outcomes and
//! pass through silently. Anything else is handed to an [`ErrorReporter`]
//! with its full source chain, then propagated unchanged.

use crate::middleware::{BoxFuture, Middleware, Next};
use std::sync::Arc;
use twinrpc_core::{Context, Invocation, ProcedureError, ProcedureResult, Value};

/// Sink for undeclared errors.
pub trait ErrorReporter: Send + Sync + 'static {
    /// Reports one undeclared error.
    fn report(&self, report: &ErrorReport<'_>);
}

/// What an [`ErrorReporter`] receives.
#[derive(Debug)]
pub struct ErrorReport<'a> {
    /// The procedure that failed.
    pub invocation: &'a Invocation,
    /// The error that escaped it.
    pub error: &'a ProcedureError,
    /// Request ID of the failed call.
    pub request_id: twinrpc_core::RequestId,
}

/// Reports through `tracing::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: &ErrorReport<'_>) {
        tracing::error!(
            request_id = %report.request_id,
            path = %report.invocation.path(),
            error = %report.error.diagnostic(),
            "undeclared procedure error"
        );
    }
}

/// Error observation middleware.
#[derive(Clone)]
pub struct ErrorObservationMiddleware {
    reporter: Arc<dyn ErrorReporter>,
}

impl Default for ErrorObservationMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorObservationMiddleware {
    /// Reports to the tracing subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Reports to a custom sink.
    #[must_use]
    pub fn with_reporter(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { reporter }
    }
}

impl std::fmt::Debug for ErrorObservationMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorObservationMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for ErrorObservationMiddleware {
    fn name(&self) -> &'static str {
        "error_observation"
    }

    fn handle<'a>(
        &'a self,
        ctx: Context,
        invocation: &'a Invocation,
        next: Next<'a>,
    ) -> BoxFuture<'a, ProcedureResult<Value>> {
        Box::pin(async move {
            let request_id = ctx.request_id();
            let result = next.run(ctx).await;
            if let Err(error) = &result {
                let expected = error.is_validation() || invocation.errors().is_declared(error);
                if !expected {
                    self.reporter.report(&ErrorReport {
                        invocation,
                        error,
                        request_id,
                    });
                }
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::middleware::Terminal;
    use crate::stages::AuthorizationMiddleware;
    use parking_lot::Mutex;
    use twinrpc_core::{kinds, ErrorSet, Input, OperationKind};

    #[derive(Default)]
    struct RecordingReporter {
        seen: Mutex<Vec<String>>,
    }

    impl ErrorReporter for RecordingReporter {
        fn report(&self, report: &ErrorReport<'_>) {
            self.seen.lock().push(report.error.diagnostic());
        }
    }

    fn failing(make: fn() -> ProcedureError) -> Arc<dyn Terminal> {
        Arc::new(move |_ctx: Context, _input: Input| -> BoxFuture<'static, ProcedureResult<Value>> {
            Box::pin(async move { Err(make()) })
        })
    }

    async fn observe(
        extra: Vec<Arc<dyn Middleware>>,
        make: fn() -> ProcedureError,
    ) -> (ProcedureError, Vec<String>) {
        let reporter = Arc::new(RecordingReporter::default());
        let mut stages: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(ErrorObservationMiddleware::with_reporter(reporter.clone()))];
        stages.extend(extra);
        let chain = Chain::new(stages, failing(make));
        let invocation =
            Invocation::new("user.getUser", OperationKind::Query, Arc::new(ErrorSet::standard()));

        let err = chain
            .call(Context::new(), &invocation, Input::none())
            .await
            .unwrap_err();
        let seen = reporter.seen.lock().clone();
        (err, seen)
    }

    #[tokio::test]
    async fn test_declared_errors_are_not_reported() {
        let (err, seen) = observe(Vec::new(), || ProcedureError::not_found("User 9 not found")).await;
        assert_eq!(err.kind(), kinds::NOT_FOUND);
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_reported() {
        let (_, seen) = observe(Vec::new(), || ProcedureError::bad_request("bad input")).await;
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn test_undeclared_errors_reported_once_and_propagated() {
        let (err, seen) = observe(Vec::new(), || {
            ProcedureError::internal_with_source(
                "write failed",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs"),
            )
        })
        .await;

        assert_eq!(err.kind(), kinds::INTERNAL_SERVER_ERROR);
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("read-only fs"));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_reported() {
        let (err, seen) = observe(Vec::new(), || ProcedureError::defined("TEAPOT")).await;
        assert_eq!(err.kind(), "TEAPOT");
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn test_sees_inner_authorization_rejection_as_declared() {
        let (err, seen) = observe(vec![Arc::new(AuthorizationMiddleware::enforcing())], || {
            ProcedureError::internal("unreachable")
        })
        .await;
        assert_eq!(err.kind(), kinds::UNAUTHORIZED);
        assert!(seen.is_empty());
    }
}
