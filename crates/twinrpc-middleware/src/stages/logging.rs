//! Call logging middleware.
//!
//! Times the rest of the chain and emits one structured log line per call,
//! whether it succeeded or not. The context and the result pass through
//! untouched.
//!
//! # Metrics Emitted
//!
//! - `twinrpc_procedure_calls_total` - Counter by path and outcome
//! - `twinrpc_procedure_duration_seconds` - Histogram by path
//!
//! # Log Format
//!
//! - `path` - Procedure path
//! - `type` - `query` or `mutation` (legacy layer only)
//! - `duration_ms` - Wall time spent in the wrapped chain

use crate::middleware::{BoxFuture, Middleware, Next};
use std::sync::Arc;
use std::time::{Duration, Instant};
use twinrpc_core::{Context, Invocation, OperationKind, ProcedureResult, Value};

/// How a call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The procedure returned a value.
    Success,
    /// The procedure (or an inner middleware) raised an error of this kind.
    Failure(String),
}

impl CallOutcome {
    const fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure(_) => "error",
        }
    }
}

/// Timing record handed to a [`TimingObserver`].
#[derive(Debug, Clone)]
pub struct CallTiming {
    /// Procedure path.
    pub path: String,
    /// Operation kind.
    pub kind: OperationKind,
    /// Time spent in the wrapped chain.
    pub duration: Duration,
    /// How the call ended.
    pub outcome: CallOutcome,
}

/// Receives a [`CallTiming`] after every call.
pub type TimingObserver = Arc<dyn Fn(&CallTiming) + Send + Sync>;

/// Logging middleware.
#[derive(Clone, Default)]
pub struct LoggingMiddleware {
    include_kind: bool,
    observer: Option<TimingObserver>,
}

impl LoggingMiddleware {
    /// Logs `{path, duration_ms}`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also logs the operation kind as `type`.
    #[must_use]
    pub fn with_kind(mut self) -> Self {
        self.include_kind = true;
        self
    }

    /// Registers an observer that receives every timing record.
    #[must_use]
    pub fn with_observer(mut self, observer: TimingObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl std::fmt::Debug for LoggingMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingMiddleware")
            .field("include_kind", &self.include_kind)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn handle<'a>(
        &'a self,
        ctx: Context,
        invocation: &'a Invocation,
        next: Next<'a>,
    ) -> BoxFuture<'a, ProcedureResult<Value>> {
        Box::pin(async move {
            let request_id = ctx.request_id();
            let start = Instant::now();
            let result = next.run(ctx).await;
            let duration = start.elapsed();
            let duration_ms = duration.as_secs_f64() * 1000.0;

            let outcome = match &result {
                Ok(_) => CallOutcome::Success,
                Err(e) => CallOutcome::Failure(e.kind().to_string()),
            };

            if self.include_kind {
                tracing::info!(
                    request_id = %request_id,
                    path = %invocation.path(),
                    r#type = %invocation.kind(),
                    duration_ms,
                    outcome = outcome.label(),
                    "procedure call"
                );
            } else {
                tracing::info!(
                    request_id = %request_id,
                    path = %invocation.path(),
                    duration_ms,
                    outcome = outcome.label(),
                    "procedure call"
                );
            }

            metrics::counter!(
                "twinrpc_procedure_calls_total",
                "path" => invocation.path().to_string(),
                "outcome" => outcome.label()
            )
            .increment(1);
            metrics::histogram!(
                "twinrpc_procedure_duration_seconds",
                "path" => invocation.path().to_string()
            )
            .record(duration.as_secs_f64());

            if let Some(observer) = &self.observer {
                observer(&CallTiming {
                    path: invocation.path().to_string(),
                    kind: invocation.kind(),
                    duration,
                    outcome,
                });
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
    use parking_lot::Mutex;
    use twinrpc_core::{ErrorSet, Input, ProcedureError};

    fn invocation(kind: OperationKind) -> Invocation {
        Invocation::new("post.getPost", kind, Arc::new(ErrorSet::standard()))
    }

    fn sleeping_terminal(ms: u64, fail: bool) -> Arc<dyn Terminal> {
        Arc::new(move |_ctx: Context, _input: Input| -> BoxFuture<'static, ProcedureResult<Value>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                if fail {
                    Err(ProcedureError::not_found("Post 999 not found"))
                } else {
                    Ok(Value::from("done"))
                }
            })
        })
    }

    fn observed() -> (LoggingMiddleware, Arc<Mutex<Vec<CallTiming>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let logging = LoggingMiddleware::new().with_observer(Arc::new(move |t: &CallTiming| {
            sink.lock().push(t.clone());
        }));
        (logging, seen)
    }

    #[tokio::test]
    async fn test_duration_covers_handler_time() {
        let (logging, seen) = observed();
        let chain = Chain::new(vec![Arc::new(logging)], sleeping_terminal(20, false));

        let out = chain
            .call(Context::new(), &invocation(OperationKind::Query), Input::none())
            .await
            .unwrap();
        assert_eq!(out, Value::from("done"));

        let timings = seen.lock();
        assert_eq!(timings.len(), 1);
        assert!(timings[0].duration >= Duration::from_millis(20));
        assert_eq!(timings[0].outcome, CallOutcome::Success);
        assert_eq!(timings[0].path, "post.getPost");
    }

    #[tokio::test]
    async fn test_failures_are_logged_and_passed_through() {
        let (logging, seen) = observed();
        let logging = logging.with_kind();
        let chain = Chain::new(vec![Arc::new(logging)], sleeping_terminal(0, true));

        let err = chain
            .call(Context::new(), &invocation(OperationKind::Mutation), Input::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");

        let timings = seen.lock();
        assert_eq!(timings[0].outcome, CallOutcome::Failure("NOT_FOUND".to_string()));
        assert_eq!(timings[0].kind, OperationKind::Mutation);
    }
}
