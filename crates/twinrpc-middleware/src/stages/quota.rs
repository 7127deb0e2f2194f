//! Quota (rate limiting) middleware.
//!
//! Looks the client up in a [`RateLimiter`] keyed by client IP (`"unknown"`
//! when the transport could not tell). A refused consumption check
//! short-circuits with `TOO_MANY_REQUESTS`. Without a limiter the stage is a
//! pass-through, which is the default.
//!
//! ## Algorithm
//!
//! [`InMemoryRateLimiter`] uses a sliding window: the previous window's count
//! is weighted by how much of the current window is still ahead, which
//! smooths the hard reset of a fixed window. Clients idle for two windows
//! carry no weight and are swept from the table once per window.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use twinrpc_middleware::stages::{InMemoryRateLimiter, QuotaMiddleware};
//!
//! let quota = QuotaMiddleware::with_limiter(Arc::new(
//!     InMemoryRateLimiter::new(100, Duration::from_secs(60)),
//! ));
//! assert!(quota.is_enabled());
//! ```

use crate::middleware::{BoxFuture, Middleware, Next};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use twinrpc_core::{Context, Invocation, ProcedureError, ProcedureResult, Value};

/// Key used when the client IP is unknown.
const UNKNOWN_CLIENT: &str = "unknown";

/// Shortest window the in-memory limiter accepts.
const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Result of a consumption check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The call may proceed.
    Allowed {
        /// Calls left in the current window.
        remaining: u64,
    },
    /// The call is refused.
    Limited {
        /// Time until the window resets.
        retry_after: Duration,
    },
}

/// Decides whether a client may make another call.
#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    /// Consumes one unit for `key` if the quota allows it.
    async fn try_consume(&self, key: &str) -> RateDecision;
}

/// Data for a single rate limit window.
#[derive(Debug, Clone)]
struct WindowData {
    /// Calls in the current window.
    count: u64,
    /// When the current window started.
    window_start: Instant,
    /// Calls in the previous window.
    prev_count: u64,
}

impl WindowData {
    /// True once the window has no bearing on future decisions.
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.window_start) >= window.saturating_mul(2)
    }
}

/// Per-client windows plus the time of the last sweep.
#[derive(Debug)]
struct WindowTable {
    clients: HashMap<String, WindowData>,
    last_sweep: Instant,
}

/// Sliding-window limiter kept in process memory.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    limit: u64,
    window: Duration,
    table: Mutex<WindowTable>,
}

impl InMemoryRateLimiter {
    /// Allows `limit` calls per `window` and client.
    ///
    /// Windows shorter than a millisecond are raised to one millisecond.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window: window.max(MIN_WINDOW),
            table: Mutex::new(WindowTable {
                clients: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Returns the per-window limit.
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Returns the window length.
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Number of clients currently holding a window.
    pub async fn tracked_clients(&self) -> usize {
        self.table.lock().await.clients.len()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    #[allow(clippy::significant_drop_tightening)]
    async fn try_consume(&self, key: &str) -> RateDecision {
        let mut table = self.table.lock().await;
        let now = Instant::now();
        let window = self.window;

        if now.duration_since(table.last_sweep) >= window {
            let before = table.clients.len();
            table.clients.retain(|_, data| !data.is_stale(now, window));
            table.last_sweep = now;
            let swept = before - table.clients.len();
            if swept > 0 {
                tracing::debug!(swept, remaining = table.clients.len(), "swept idle quota windows");
            }
        }

        let data = table.clients.entry(key.to_string()).or_insert_with(|| WindowData {
            count: 0,
            window_start: now,
            prev_count: 0,
        });

        let elapsed = now.duration_since(data.window_start);
        if elapsed >= window {
            // Two or more windows without traffic forget the history.
            let windows_passed = elapsed.as_nanos() / window.as_nanos();
            data.prev_count = if windows_passed >= 2 { 0 } else { data.count };
            data.count = 0;
            data.window_start = now;
        }

        let progress = now.duration_since(data.window_start).as_secs_f64() / window.as_secs_f64();
        let weighted = data.count + (data.prev_count as f64 * (1.0 - progress)) as u64;

        if weighted >= self.limit {
            let retry_after = window.saturating_sub(now.duration_since(data.window_start));
            return RateDecision::Limited { retry_after };
        }

        data.count += 1;
        RateDecision::Allowed {
            remaining: self.limit.saturating_sub(weighted + 1),
        }
    }
}

/// Quota middleware.
#[derive(Clone, Default)]
pub struct QuotaMiddleware {
    limiter: Option<Arc<dyn RateLimiter>>,
}

impl QuotaMiddleware {
    /// A pass-through quota stage.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A quota stage backed by the given limiter.
    #[must_use]
    pub fn with_limiter(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            limiter: Some(limiter),
        }
    }

    /// Returns true if a limiter is configured.
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}

impl std::fmt::Debug for QuotaMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaMiddleware")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Middleware for QuotaMiddleware {
    fn name(&self) -> &'static str {
        "quota"
    }

    fn handle<'a>(
        &'a self,
        ctx: Context,
        invocation: &'a Invocation,
        next: Next<'a>,
    ) -> BoxFuture<'a, ProcedureResult<Value>> {
        Box::pin(async move {
            let Some(limiter) = &self.limiter else {
                return next.run(ctx).await;
            };

            let key = ctx.client_ip().unwrap_or(UNKNOWN_CLIENT).to_string();
            match limiter.try_consume(&key).await {
                RateDecision::Allowed { .. } => next.run(ctx).await,
                RateDecision::Limited { retry_after } => {
                    tracing::warn!(
                        client = %key,
                        path = %invocation.path(),
                        retry_after_secs = retry_after.as_secs(),
                        "quota exhausted"
                    );
                    Err(ProcedureError::too_many_requests())
                }
            }
        })
    }
}
