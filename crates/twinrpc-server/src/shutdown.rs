//! Stopping the server without cutting calls short.
//!
//! [`ShutdownSignal`] fans one stop request out to the accept loop and to
//! every open connection. Connections then finish the request they are
//! serving and close. [`Drain`] counts what is still running, split into
//! sockets and calls on each RPC layer, so the server can report and wait for
//! in-flight legacy and contract calls before it exits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};

/// A stop request shared by the accept loop and the connections.
///
/// ```rust
/// use twinrpc_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let listener_side = shutdown.clone();
///
/// shutdown.trigger();
/// assert!(listener_side.is_shutdown());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    stopped: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates a signal that has not fired.
    #[must_use]
    pub fn new() -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            stopped: Arc::new(stopped),
        }
    }

    /// Fires the signal. Later calls do nothing.
    pub fn trigger(&self) {
        if !self.stopped.send_replace(true) {
            tracing::debug!("shutdown requested");
        }
    }

    /// Returns true once fired.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Completes when the signal fires, at once if it already has.
    pub async fn recv(&self) {
        let mut stopped = self.stopped.subscribe();
        // The sender outlives this borrow, so the channel cannot close here.
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }

    /// A signal fired by SIGTERM or SIGINT (Ctrl+C off Unix).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            wait_for_os_signal().await;
            trigger.trigger();
        });
        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for SIGTERM or SIGINT. When no handler can be installed the error
/// is logged and the future never completes.
async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "failed to register signal handlers");
                    return std::future::pending().await;
                }
            };

        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        tracing::info!(signal = name, "stopping twinrpc server");
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to wait for Ctrl+C");
            return std::future::pending().await;
        }
        tracing::info!(signal = "ctrl-c", "stopping twinrpc server");
    }
}

/// What a [`DrainGuard`] holds open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// An accepted socket.
    Connection,
    /// A call on the legacy layer.
    LegacyCall,
    /// A call on the contract layer.
    ContractCall,
}

impl Activity {
    const fn slot(self) -> usize {
        match self {
            Self::Connection => 0,
            Self::LegacyCall => 1,
            Self::ContractCall => 2,
        }
    }
}

/// Counts at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSnapshot {
    /// Open sockets.
    pub connections: usize,
    /// Legacy calls still running.
    pub legacy_calls: usize,
    /// Contract calls still running.
    pub contract_calls: usize,
}

impl DrainSnapshot {
    /// Nothing is open or running.
    pub const fn is_idle(&self) -> bool {
        self.connections == 0 && self.legacy_calls == 0 && self.contract_calls == 0
    }
}

#[derive(Debug, Default)]
struct DrainState {
    counts: [AtomicUsize; 3],
    idle: Notify,
}

/// Open sockets and in-flight calls of one [`App`](crate::App).
///
/// ```rust
/// use twinrpc_server::shutdown::{Activity, Drain};
///
/// let drain = Drain::new();
/// let socket = drain.track(Activity::Connection);
/// let call = drain.track(Activity::ContractCall);
/// assert_eq!(drain.snapshot().contract_calls, 1);
///
/// drop(call);
/// drop(socket);
/// assert!(drain.snapshot().is_idle());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Drain {
    state: Arc<DrainState>,
}

impl Drain {
    /// An idle drain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts `activity` until the guard is dropped.
    #[must_use]
    pub fn track(&self, activity: Activity) -> DrainGuard {
        self.state.counts[activity.slot()].fetch_add(1, Ordering::SeqCst);
        DrainGuard {
            state: Arc::clone(&self.state),
            activity,
        }
    }

    /// Current counts.
    pub fn snapshot(&self) -> DrainSnapshot {
        self.state.snapshot()
    }

    /// Completes once nothing is open or running.
    pub async fn idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.state.snapshot().is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl DrainState {
    fn snapshot(&self) -> DrainSnapshot {
        let load = |activity: Activity| self.counts[activity.slot()].load(Ordering::SeqCst);
        DrainSnapshot {
            connections: load(Activity::Connection),
            legacy_calls: load(Activity::LegacyCall),
            contract_calls: load(Activity::ContractCall),
        }
    }
}

/// Keeps one socket or call counted.
#[derive(Debug)]
pub struct DrainGuard {
    state: Arc<DrainState>,
    activity: Activity,
}

impl DrainGuard {
    /// What this guard counts.
    pub const fn activity(&self) -> Activity {
        self.activity
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.state.counts[self.activity.slot()].fetch_sub(1, Ordering::SeqCst);
        if self.state.snapshot().is_idle() {
            self.state.idle.notify_waiters();
        }
    }
}
