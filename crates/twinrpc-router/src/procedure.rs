//! Procedure definitions.
//!
//! A procedure binds an input parser, an operation kind, a declared error set
//! and a body to a middleware chain. The chain is folded when the procedure
//! is built; input parsing and validation happen in the innermost step so
//! that every middleware still wraps them.

use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use twinrpc_core::{
    BinaryInput, Context, ErrorSet, FieldErrors, FormData, Input, Invocation, OperationKind,
    ProcedureError, ProcedureResult, Value,
};
use twinrpc_middleware::{BoxFuture, Chain, Middleware, Terminal};

/// Post-deserialization checks on a procedure input.
///
/// Deserialization covers the shape; `validate` covers the rest (lengths,
/// ranges, formats). The default accepts everything.
pub trait Validate {
    /// Returns field issues, if any.
    fn validate(&self) -> Result<(), FieldErrors> {
        Ok(())
    }
}

impl Validate for () {}
impl Validate for Value {}
impl Validate for serde_json::Value {}

/// An absent input is valid; a present one is validated as usual.
impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> Result<(), FieldErrors> {
        self.as_ref().map_or(Ok(()), Validate::validate)
    }
}

/// The payload shape a procedure reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    /// Ignores its input.
    None,
    /// A JSON document.
    Json,
    /// A raw octet stream.
    Binary,
    /// A multipart form.
    Form,
}

/// Clone-able procedure base: middleware plus declared errors.
///
/// Cloning a base and adding middleware to the clone is how a "protected"
/// base is derived from a "public" one.
#[derive(Clone, Default)]
pub struct ProcedureBuilder {
    middleware: Vec<Arc<dyn Middleware>>,
    errors: Arc<ErrorSet>,
}

impl ProcedureBuilder {
    /// An empty base: no middleware, no declared errors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the error set of every procedure built from this base.
    #[must_use]
    pub fn errors(mut self, errors: ErrorSet) -> Self {
        self.errors = Arc::new(errors);
        self
    }

    /// Appends a middleware; it wraps inside everything added before it.
    #[must_use]
    pub fn use_middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware.
    #[must_use]
    pub fn use_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Names of the middleware so far, outermost first.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Declares a typed JSON input.
    pub fn input<I>(self) -> TypedProcedureBuilder<I>
    where
        I: DeserializeOwned + Validate + Send + 'static,
    {
        TypedProcedureBuilder {
            base: self,
            _input: PhantomData,
        }
    }

    /// Builds a query that takes no input.
    pub fn query<F, Fut, O>(self, handler: F) -> Procedure
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult<O>> + Send + 'static,
        O: Into<Value> + 'static,
    {
        self.no_input(OperationKind::Query, handler)
    }

    /// Builds a mutation that takes no input.
    pub fn mutation<F, Fut, O>(self, handler: F) -> Procedure
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult<O>> + Send + 'static,
        O: Into<Value> + 'static,
    {
        self.no_input(OperationKind::Mutation, handler)
    }

    /// Builds a mutation reading a raw octet-stream body.
    pub fn binary_mutation<F, Fut, O>(self, handler: F) -> Procedure
    where
        F: Fn(Context, BinaryInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult<O>> + Send + 'static,
        O: Into<Value> + 'static,
    {
        let handler = Arc::new(handler);
        let terminal = move |ctx: Context, input: Input| -> BoxFuture<'static, ProcedureResult<Value>> {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                match input {
                    Input::Binary(body) => handler(ctx, body).await.map(Into::into),
                    other => Err(ProcedureError::bad_request(format!(
                        "expected an octet-stream body, got a {} payload",
                        other.shape()
                    ))),
                }
            })
        };
        self.build(OperationKind::Mutation, InputShape::Binary, Arc::new(terminal))
    }

    /// Builds a mutation reading a multipart form.
    pub fn form_mutation<F, Fut, O>(self, handler: F) -> Procedure
    where
        F: Fn(Context, FormData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult<O>> + Send + 'static,
        O: Into<Value> + 'static,
    {
        let handler = Arc::new(handler);
        let terminal = move |ctx: Context, input: Input| -> BoxFuture<'static, ProcedureResult<Value>> {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                match input {
                    Input::Form(form) => handler(ctx, form).await.map(Into::into),
                    other => Err(ProcedureError::bad_request(format!(
                        "expected a multipart form, got a {} payload",
                        other.shape()
                    ))),
                }
            })
        };
        self.build(OperationKind::Mutation, InputShape::Form, Arc::new(terminal))
    }

    fn no_input<F, Fut, O>(self, kind: OperationKind, handler: F) -> Procedure
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult<O>> + Send + 'static,
        O: Into<Value> + 'static,
    {
        let handler = Arc::new(handler);
        let terminal = move |ctx: Context, _input: Input| -> BoxFuture<'static, ProcedureResult<Value>> {
            let handler = Arc::clone(&handler);
            Box::pin(async move { handler(ctx).await.map(Into::into) })
        };
        self.build(kind, InputShape::None, Arc::new(terminal))
    }

    fn build(self, kind: OperationKind, shape: InputShape, terminal: Arc<dyn Terminal>) -> Procedure {
        Procedure {
            kind,
            shape,
            errors: self.errors,
            chain: Chain::new(self.middleware, terminal),
        }
    }
}

impl std::fmt::Debug for ProcedureBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureBuilder")
            .field("middleware", &self.stage_names())
            .field("errors", &self.errors.kinds().collect::<Vec<_>>())
            .finish()
    }
}

/// A [`ProcedureBuilder`] with a declared input type.
pub struct TypedProcedureBuilder<I> {
    base: ProcedureBuilder,
    _input: PhantomData<fn() -> I>,
}

impl<I> TypedProcedureBuilder<I>
where
    I: DeserializeOwned + Validate + Send + 'static,
{
    /// Builds a query.
    pub fn query<F, Fut, O>(self, handler: F) -> Procedure
    where
        F: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult<O>> + Send + 'static,
        O: Into<Value> + 'static,
    {
        self.typed(OperationKind::Query, handler)
    }

    /// Builds a mutation.
    pub fn mutation<F, Fut, O>(self, handler: F) -> Procedure
    where
        F: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult<O>> + Send + 'static,
        O: Into<Value> + 'static,
    {
        self.typed(OperationKind::Mutation, handler)
    }

    fn typed<F, Fut, O>(self, kind: OperationKind, handler: F) -> Procedure
    where
        F: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcedureResult<O>> + Send + 'static,
        O: Into<Value> + 'static,
    {
        let handler = Arc::new(handler);
        let terminal = move |ctx: Context, input: Input| -> BoxFuture<'static, ProcedureResult<Value>> {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let parsed = parse_input::<I>(input)?;
                let output: O = handler(ctx, parsed).await?;
                Ok::<Value, ProcedureError>(output.into())
            })
        };
        self.base
            .build(kind, InputShape::Json, Arc::new(terminal))
    }
}

/// Deserializes and validates a JSON input.
fn parse_input<I>(input: Input) -> ProcedureResult<I>
where
    I: DeserializeOwned + Validate,
{
    let Input::Json(value) = input else {
        return Err(ProcedureError::bad_request(format!(
            "expected a JSON payload, got a {} payload",
            input.shape()
        )));
    };

    let parsed: I = twinrpc_core::from_value(value).map_err(|e| {
        let mut issues = FieldErrors::new();
        issues.add("input", e.to_string());
        ProcedureError::validation("Input validation failed", issues)
    })?;

    parsed
        .validate()
        .map_err(|issues| ProcedureError::validation("Input validation failed", issues))?;
    Ok(parsed)
}

/// A built procedure.
#[derive(Clone)]
pub struct Procedure {
    kind: OperationKind,
    shape: InputShape,
    errors: Arc<ErrorSet>,
    chain: Chain,
}

impl Procedure {
    /// Query or mutation.
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The payload shape the body reads.
    pub const fn shape(&self) -> InputShape {
        self.shape
    }

    /// The declared errors.
    pub fn errors(&self) -> &Arc<ErrorSet> {
        &self.errors
    }

    /// The folded middleware chain.
    pub const fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Runs the chain and body for one call.
    pub async fn call(
        &self,
        ctx: Context,
        invocation: &Invocation,
        input: Input,
    ) -> ProcedureResult<Value> {
        self.chain.call(ctx, invocation, input).await
    }
}

impl std::fmt::Debug for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procedure")
            .field("kind", &self.kind)
            .field("shape", &self.shape)
            .field("chain", &self.chain)
            .finish()
    }
}
