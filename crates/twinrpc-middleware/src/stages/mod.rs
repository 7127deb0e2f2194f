//! Standard middleware stages.
//!
//! Both RPC layers build their base chain from these stages in the same
//! order: logging, error observation, quota. Protected procedures append
//! authorization.

mod authorization;
mod error_observation;
mod logging;
mod quota;

pub use authorization::{AuthMode, AuthorizationMiddleware, IdentityVerifier};
pub use error_observation::{ErrorObservationMiddleware, ErrorReport, ErrorReporter, TracingReporter};
pub use logging::{CallOutcome, CallTiming, LoggingMiddleware, TimingObserver};
pub use quota::{InMemoryRateLimiter, QuotaMiddleware, RateDecision, RateLimiter};
