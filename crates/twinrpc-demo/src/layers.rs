//! Procedure bases of the two transports.
//!
//! Stages run in this order for every procedure:
//!
//! ```text
//! logging → error observation → quota → [authorization] → handler
//! ```
//!
//! Authorization is only added to the protected base. Whether it rejects
//! anonymous callers is decided per transport by the security section.

use std::sync::Arc;
use std::time::Duration;

use twinrpc_config::{AppConfig, QuotaConfig, SecurityConfig};
use twinrpc_core::ErrorSet;
use twinrpc_middleware::stages::{
    AuthMode, AuthorizationMiddleware, ErrorObservationMiddleware, InMemoryRateLimiter,
    LoggingMiddleware, QuotaMiddleware, RateLimiter,
};
use twinrpc_router::{ProcedureBuilder, Router, RouterError};

use crate::procedures::{self, Bases, Services};

/// One of the two RPC transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Batched JSON-RPC style transport.
    Legacy,
    /// Contract-first transport.
    Contract,
}

impl Transport {
    fn errors(self) -> ErrorSet {
        match self {
            Self::Legacy => ErrorSet::legacy(),
            Self::Contract => ErrorSet::standard(),
        }
    }

    fn logging(self) -> LoggingMiddleware {
        match self {
            Self::Legacy => LoggingMiddleware::new().with_kind(),
            Self::Contract => LoggingMiddleware::new(),
        }
    }

    const fn enforces_auth(self, security: &SecurityConfig) -> bool {
        match self {
            Self::Legacy => security.enforce_legacy_auth,
            Self::Contract => security.enforce_contract_auth,
        }
    }
}

/// The limiter both transports share, if quotas are enabled.
pub fn rate_limiter(quota: &QuotaConfig) -> Option<Arc<dyn RateLimiter>> {
    quota.enabled.then(|| {
        Arc::new(InMemoryRateLimiter::new(
            quota.limit,
            Duration::from_secs(quota.window_secs),
        )) as Arc<dyn RateLimiter>
    })
}

/// Builds the public and protected bases of one transport.
pub fn bases(
    transport: Transport,
    security: &SecurityConfig,
    limiter: Option<Arc<dyn RateLimiter>>,
) -> Bases {
    let quota = limiter.map_or_else(QuotaMiddleware::disabled, QuotaMiddleware::with_limiter);

    let public = ProcedureBuilder::new()
        .errors(transport.errors())
        .use_middleware(transport.logging())
        .use_middleware(ErrorObservationMiddleware::new())
        .use_middleware(quota);

    let mode = if transport.enforces_auth(security) {
        AuthMode::Enforcing
    } else {
        AuthMode::Permissive
    };
    let protected = public
        .clone()
        .use_middleware(AuthorizationMiddleware::with_mode(mode));

    Bases { public, protected }
}

/// Builds the legacy and contract routers over the same services.
pub fn routers(config: &AppConfig, services: &Services) -> Result<(Router, Router), RouterError> {
    let limiter = rate_limiter(&config.quota);
    let legacy = bases(Transport::Legacy, &config.security, limiter.clone());
    let contract = bases(Transport::Contract, &config.security, limiter);

    Ok((
        procedures::router(&legacy, services)?,
        procedures::router(&contract, services)?,
    ))
}
