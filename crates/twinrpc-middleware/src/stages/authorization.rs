//! Authorization middleware.
//!
//! Requires an identity token on the context. In [`AuthMode::Enforcing`] a
//! missing token short-circuits with `UNAUTHORIZED`; in
//! [`AuthMode::Permissive`] the call is logged and let through.
//!
//! The token itself is never trusted: `context.user` is only set when an
//! [`IdentityVerifier`] resolves the token to a user.

use crate::middleware::{BoxFuture, Middleware, Next};
use async_trait::async_trait;
use std::sync::Arc;
use twinrpc_core::{Context, Invocation, ProcedureError, ProcedureResult, UserIdentity, Value};

/// Whether a missing identity rejects the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Reject calls without a (verified) identity.
    #[default]
    Enforcing,
    /// Log and let calls through.
    Permissive,
}

/// Resolves an identity token to a user.
#[async_trait]
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Returns the user the token belongs to, or `None` for an invalid token.
    async fn verify(&self, token: &str) -> Result<Option<UserIdentity>, ProcedureError>;
}

/// Authorization middleware.
#[derive(Clone, Default)]
pub struct AuthorizationMiddleware {
    mode: AuthMode,
    verifier: Option<Arc<dyn IdentityVerifier>>,
}

impl AuthorizationMiddleware {
    /// Rejects calls without an identity token.
    #[must_use]
    pub fn enforcing() -> Self {
        Self::with_mode(AuthMode::Enforcing)
    }

    /// Lets calls without an identity token through.
    #[must_use]
    pub fn permissive() -> Self {
        Self::with_mode(AuthMode::Permissive)
    }

    /// Creates the middleware in the given mode.
    #[must_use]
    pub fn with_mode(mode: AuthMode) -> Self {
        Self {
            mode,
            verifier: None,
        }
    }

    /// Resolves tokens to users with the given verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Returns the mode.
    pub const fn mode(&self) -> AuthMode {
        self.mode
    }

    fn deny(&self, invocation: &Invocation, reason: &'static str) -> Option<ProcedureError> {
        match self.mode {
            AuthMode::Enforcing => {
                tracing::debug!(path = %invocation.path(), reason, "rejecting unauthenticated call");
                Some(ProcedureError::unauthorized())
            }
            AuthMode::Permissive => {
                tracing::debug!(path = %invocation.path(), reason, "permissive auth, continuing");
                None
            }
        }
    }
}

impl std::fmt::Debug for AuthorizationMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationMiddleware")
            .field("mode", &self.mode)
            .field("verifier", &self.verifier.is_some())
            .finish()
    }
}

impl Middleware for AuthorizationMiddleware {
    fn name(&self) -> &'static str {
        "authorization"
    }

    fn handle<'a>(
        &'a self,
        ctx: Context,
        invocation: &'a Invocation,
        next: Next<'a>,
    ) -> BoxFuture<'a, ProcedureResult<Value>> {
        Box::pin(async move {
            let Some(token) = ctx.identity_token().map(str::to_string) else {
                if let Some(err) = self.deny(invocation, "missing identity token") {
                    return Err(err);
                }
                return next.run(ctx).await;
            };

            let Some(verifier) = &self.verifier else {
                return next.run(ctx).await;
            };

            match verifier.verify(&token).await? {
                Some(user) => next.run(ctx.with_user(user)).await,
                None => {
                    if let Some(err) = self.deny(invocation, "identity token rejected") {
                        return Err(err);
                    }
                    next.run(ctx).await
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::middleware::Terminal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use twinrpc_core::{ErrorSet, Input, OperationKind};

    struct StaticVerifier;

    #[async_trait]
    impl IdentityVerifier for StaticVerifier {
        async fn verify(&self, token: &str) -> Result<Option<UserIdentity>, ProcedureError> {
            Ok((token == "good").then(|| UserIdentity::new("1", "john@example.com")))
        }
    }

    fn invocation() -> Invocation {
        Invocation::new("post.getPosts", OperationKind::Query, Arc::new(ErrorSet::standard()))
    }

    /// Terminal that counts calls and echoes the resolved user id.
    fn counting_terminal(calls: Arc<AtomicUsize>) -> Arc<dyn Terminal> {
        Arc::new(move |ctx: Context, _input: Input| -> BoxFuture<'static, ProcedureResult<Value>> {
            calls.fetch_add(1, Ordering::SeqCst);
            let user = ctx.user().map(|u| u.id.clone());
            Box::pin(async move { Ok(Value::from(user)) })
        })
    }

    async fn run(auth: AuthorizationMiddleware, ctx: Context) -> (ProcedureResult<Value>, usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new(vec![Arc::new(auth)], counting_terminal(calls.clone()));
        let result = chain.call(ctx, &invocation(), Input::none()).await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_enforcing_rejects_before_handler() {
        let (result, calls) = run(AuthorizationMiddleware::enforcing(), Context::new()).await;
        assert_eq!(result.unwrap_err().kind(), "UNAUTHORIZED");
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_permissive_lets_anonymous_through() {
        let (result, calls) = run(AuthorizationMiddleware::permissive(), Context::new()).await;
        assert!(result.unwrap().is_null());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_token_without_verifier_does_not_fabricate_user() {
        let ctx = Context::new().with_identity_token("anything");
        let (result, calls) = run(AuthorizationMiddleware::enforcing(), ctx).await;
        assert!(result.unwrap().is_null());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_verifier_sets_user() {
        let auth = AuthorizationMiddleware::enforcing().with_verifier(Arc::new(StaticVerifier));
        let ctx = Context::new().with_identity_token("good");
        let (result, _) = run(auth, ctx).await;
        assert_eq!(result.unwrap(), Value::from("1"));
    }

    #[tokio::test]
    async fn test_rejected_token_in_enforcing_mode() {
        let auth = AuthorizationMiddleware::enforcing().with_verifier(Arc::new(StaticVerifier));
        let ctx = Context::new().with_identity_token("forged");
        let (result, calls) = run(auth, ctx).await;
        assert_eq!(result.unwrap_err().kind(), "UNAUTHORIZED");
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_rejected_token_in_permissive_mode_has_no_user() {
        let auth = AuthorizationMiddleware::permissive().with_verifier(Arc::new(StaticVerifier));
        let ctx = Context::new().with_identity_token("forged");
        let (result, calls) = run(auth, ctx).await;
        assert!(result.unwrap().is_null());
        assert_eq!(calls, 1);
    }
}
