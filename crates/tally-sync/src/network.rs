//! # Network Status Monitor
//!
//! Single source of truth for "can this terminal reach the server right now".
//!
//! ## Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │              set_online(false)                                          │
//! │   ┌────────┐ ──────────────────────► ┌─────────┐                        │
//! │   │ ONLINE │                         │ OFFLINE │                        │
//! │   └────────┘ ◄────────────────────── └─────────┘                        │
//! │       ▲        set_online(true)                                         │
//! │       │                                                                 │
//! │    initial state (optimistic)                                           │
//! │                                                                         │
//! │  • Each edge fires every subscriber once, in registration order.       │
//! │  • Repeating the current status fires nothing.                         │
//! │  • No debouncing here; flapping yields one callback per edge.          │
//! │  • A panicking subscriber is logged and skipped.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events come from the platform (via [`NetworkMonitor::set_online`]) or from
//! the health probe started with [`spawn_probe`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::remote::RemoteApi;

/// Callback invoked with the new status on every edge.
pub type StatusCallback = Arc<dyn Fn(bool) + Send + Sync>;

struct MonitorInner {
    online: AtomicBool,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, StatusCallback)>>,
}

/// Connectivity tracker shared by the sync manager and the authenticator.
///
/// Cloning yields another handle to the same monitor.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.current_status())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    /// Creates a monitor that starts online.
    pub fn new() -> Self {
        Self::with_status(true)
    }

    pub fn with_status(online: bool) -> Self {
        NetworkMonitor {
            inner: Arc::new(MonitorInner {
                online: AtomicBool::new(online),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current connectivity. Never blocks.
    pub fn current_status(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Registers a callback for every future edge.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));

        debug!(subscription = id, "Network status subscriber added");

        Subscription {
            id,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    /// Reports a platform connectivity event.
    ///
    /// Returns `true` if this changed the status (and callbacks fired).
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.inner.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return false;
        }

        info!(online, "Network status changed");

        // Snapshot so callbacks can subscribe/unsubscribe without deadlocking.
        let callbacks: Vec<(u64, StatusCallback)> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(online))).is_err() {
                error!(subscription = id, online, "Network status subscriber panicked");
            }
        }

        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Handle returned by [`NetworkMonitor::subscribe`].
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    monitor: Weak<MonitorInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the callback. No-op if the monitor is gone.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.monitor.upgrade() {
            inner
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
            debug!(subscription = self.id, "Network status subscriber removed");
        }
    }
}

// =============================================================================
// Health Probe
// =============================================================================

/// Polls the server's health endpoint and feeds the result to `monitor`.
///
/// Runs until the returned handle is aborted.
pub fn spawn_probe(
    monitor: NetworkMonitor,
    remote: Arc<dyn RemoteApi>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let reachable = match remote.health().await {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "Health probe failed");
                    false
                }
            };
            monitor.set_online(reachable);
        }
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
