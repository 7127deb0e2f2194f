//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that all interceptors
//! implement, the [`Terminal`] trait for procedure bodies, and the [`Next`]
//! continuation that links them.
//!
//! # Example
//!
//! ```
//! use twinrpc_core::{Context, Invocation, ProcedureResult, Value};
//! use twinrpc_middleware::{BoxFuture, Middleware, Next};
//!
//! struct Tagging;
//!
//! impl Middleware for Tagging {
//!     fn name(&self) -> &'static str {
//!         "tagging"
//!     }
//!
//!     fn handle<'a>(
//!         &'a self,
//!         ctx: Context,
//!         _invocation: &'a Invocation,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, ProcedureResult<Value>> {
//!         Box::pin(async move { next.run(ctx.with_header("x-tag", "1")).await })
//!     }
//! }
//! ```

use crate::chain::Link;
use std::future::Future;
use std::pin::Pin;
use twinrpc_core::{Context, Input, Invocation, ProcedureResult, Value};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An interceptor around a procedure call.
///
/// # Invariants
///
/// - Middleware calls `next.run()` at most once
/// - Middleware passes an extended *copy* of the context downstream
/// - Middleware does not rewrite errors coming back from downstream
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this middleware, used in logs and chain listings.
    fn name(&self) -> &'static str;

    /// Handles one call.
    ///
    /// Returning without calling `next` short-circuits the chain.
    fn handle<'a>(
        &'a self,
        ctx: Context,
        invocation: &'a Invocation,
        next: Next<'a>,
    ) -> BoxFuture<'a, ProcedureResult<Value>>;
}

/// The innermost step of a chain: input parsing plus the procedure body.
pub trait Terminal: Send + Sync + 'static {
    /// Runs the procedure body.
    fn call(&self, ctx: Context, input: Input) -> BoxFuture<'_, ProcedureResult<Value>>;
}

impl<F> Terminal for F
where
    F: Fn(Context, Input) -> BoxFuture<'static, ProcedureResult<Value>> + Send + Sync + 'static,
{
    fn call(&self, ctx: Context, input: Input) -> BoxFuture<'_, ProcedureResult<Value>> {
        self(ctx, input)
    }
}

/// Continuation handed to a middleware.
///
/// Consumed by [`Next::run`], so the rest of the chain runs at most once.
pub struct Next<'a> {
    link: &'a Link,
    invocation: &'a Invocation,
    input: Input,
}

impl<'a> Next<'a> {
    pub(crate) const fn new(link: &'a Link, invocation: &'a Invocation, input: Input) -> Self {
        Self {
            link,
            invocation,
            input,
        }
    }

    /// The payload that will reach the procedure body.
    pub const fn input(&self) -> &Input {
        &self.input
    }

    /// Runs the remainder of the chain with the given context.
    pub async fn run(self, ctx: Context) -> ProcedureResult<Value> {
        match self.link {
            Link::Middleware { middleware, next } => {
                middleware
                    .handle(ctx, self.invocation, Next::new(next, self.invocation, self.input))
                    .await
            }
            Link::Terminal(terminal) => terminal.call(ctx, self.input).await,
        }
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("path", &self.invocation.path())
            .field("input", &self.input.shape())
            .finish()
    }
}
