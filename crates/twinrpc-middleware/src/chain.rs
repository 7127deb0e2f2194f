//! Pre-folded middleware chain.
//!
//! [`Chain::new`] folds the middleware list from the innermost element
//! outward into a linked structure ending at the [`Terminal`]. The first
//! middleware in the list wraps outermost. Nothing is rebuilt per call.

use crate::middleware::{Middleware, Next, Terminal};
use std::sync::Arc;
use twinrpc_core::{Context, Input, Invocation, ProcedureResult, Value};

/// One link of a folded chain.
pub(crate) enum Link {
    /// A middleware and the rest of the chain.
    Middleware {
        middleware: Arc<dyn Middleware>,
        next: Arc<Link>,
    },
    /// The procedure body.
    Terminal(Arc<dyn Terminal>),
}

/// An ordered middleware list folded around a terminal.
#[derive(Clone)]
pub struct Chain {
    head: Arc<Link>,
    names: Vec<&'static str>,
}

impl Chain {
    /// Folds `middleware` (outermost first) around `terminal`.
    pub fn new(middleware: Vec<Arc<dyn Middleware>>, terminal: Arc<dyn Terminal>) -> Self {
        let names = middleware.iter().map(|m| m.name()).collect();
        let head = middleware
            .into_iter()
            .rev()
            .fold(Arc::new(Link::Terminal(terminal)), |next, middleware| {
                Arc::new(Link::Middleware { middleware, next })
            });
        Self { head, names }
    }

    /// Runs the chain for one call.
    pub async fn call(
        &self,
        ctx: Context,
        invocation: &Invocation,
        input: Input,
    ) -> ProcedureResult<Value> {
        Next::new(&self.head, invocation, input).run(ctx).await
    }

    /// Names of the middleware, outermost first.
    pub fn stage_names(&self) -> &[&'static str] {
        &self.names
    }

    /// Number of middleware in the chain.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the chain only holds the terminal.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("stages", &self.names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::BoxFuture;
    use parking_lot::Mutex;
    use twinrpc_core::{ErrorSet, OperationKind, ProcedureError};

    struct OrderTrackingMiddleware {
        name: &'static str,
        order: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for OrderTrackingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn handle<'a>(
            &'a self,
            ctx: Context,
            _invocation: &'a Invocation,
            next: Next<'a>,
        ) -> BoxFuture<'a, ProcedureResult<Value>> {
            Box::pin(async move {
                self.order.lock().push(format!("{}:in", self.name));
                let result = next.run(ctx).await;
                self.order.lock().push(format!("{}:out", self.name));
                result
            })
        }
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn name(&self) -> &'static str {
            "short_circuit"
        }

        fn handle<'a>(
            &'a self,
            _ctx: Context,
            _invocation: &'a Invocation,
            _next: Next<'a>,
        ) -> BoxFuture<'a, ProcedureResult<Value>> {
            Box::pin(async { Err(ProcedureError::unauthorized()) })
        }
    }

    struct AddHeader;

    impl Middleware for AddHeader {
        fn name(&self) -> &'static str {
            "add_header"
        }

        fn handle<'a>(
            &'a self,
            ctx: Context,
            _invocation: &'a Invocation,
            next: Next<'a>,
        ) -> BoxFuture<'a, ProcedureResult<Value>> {
            Box::pin(async move { next.run(ctx.with_header("x-seen", "yes")).await })
        }
    }

    fn invocation() -> Invocation {
        Invocation::new("test.echo", OperationKind::Query, Arc::new(ErrorSet::standard()))
    }

    fn recording_terminal(order: Arc<Mutex<Vec<String>>>) -> Arc<dyn Terminal> {
        Arc::new(move |ctx: Context, input: Input| -> BoxFuture<'static, ProcedureResult<Value>> {
            order.lock().push("handler".to_string());
            Box::pin(async move {
                let seen = ctx.header("x-seen").map(str::to_string);
                match input {
                    Input::Json(v) => Ok(Value::object([("input", v), ("seen", seen.into())])),
                    _ => Ok(Value::Null),
                }
            })
        })
    }

    #[tokio::test]
    async fn test_first_registered_wraps_outermost() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new(
            vec![
                Arc::new(OrderTrackingMiddleware { name: "a", order: order.clone() }),
                Arc::new(OrderTrackingMiddleware { name: "b", order: order.clone() }),
            ],
            recording_terminal(order.clone()),
        );

        chain.call(Context::new(), &invocation(), Input::none()).await.unwrap();

        assert_eq!(
            *order.lock(),
            vec!["a:in", "b:in", "handler", "b:out", "a:out"]
        );
        assert_eq!(chain.stage_names(), &["a", "b"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner_links() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new(
            vec![
                Arc::new(OrderTrackingMiddleware { name: "outer", order: order.clone() }),
                Arc::new(ShortCircuit),
                Arc::new(OrderTrackingMiddleware { name: "inner", order: order.clone() }),
            ],
            recording_terminal(order.clone()),
        );

        let err = chain
            .call(Context::new(), &invocation(), Input::none())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "UNAUTHORIZED");
        assert_eq!(*order.lock(), vec!["outer:in", "outer:out"]);
    }

    #[tokio::test]
    async fn test_context_copy_flows_downstream() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new(vec![Arc::new(AddHeader)], recording_terminal(order));

        let out = chain
            .call(Context::new(), &invocation(), Input::Json(Value::from(7_i64)))
            .await
            .unwrap();

        assert_eq!(out.get("seen").and_then(Value::as_str), Some("yes"));
        assert_eq!(out.get("input").and_then(Value::as_i64), Some(7));
    }

    #[tokio::test]
    async fn test_chain_is_reusable_across_calls() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new(Vec::new(), recording_terminal(order.clone()));
        assert!(chain.is_empty());

        for _ in 0..3 {
            chain.call(Context::new(), &invocation(), Input::none()).await.unwrap();
        }
        assert_eq!(order.lock().len(), 3);
    }
}
