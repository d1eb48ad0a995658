//! # Sync Manager
//!
//! Drains the sales and credits queues to the server, at most one run at a
//! time.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            sync_now()  ── offline? ──────────► Skipped(Offline)         │
//! │                 │                                                       │
//! │                 ├───── CAS(false → true) lost ─► Skipped(AlreadyRunning)│
//! │                 ▼                                                       │
//! │   ┌──────┐   ┌─────────────────────────────────────────────┐            │
//! │   │ IDLE │──►│ RUNNING                                     │            │
//! │   └──────┘   │  sales   : one pass, insertion order        │            │
//! │       ▲      │  credits : one pass, insertion order        │            │
//! │       │      │  each ack → mark_synced before the next     │            │
//! │       │      │  each failure → attempts+1, next_attempt_at │            │
//! │       │      │  recount → SyncState                        │            │
//! │       │      └───────────────────────┬─────────────────────┘            │
//! │       └──── guard dropped ───────────┘                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Triggers
//! ```text
//! explicit      sync_now() / record_sale() / record_credit()
//! reconnect     offline → online arms a timer (reconnect_delay, default 5s)
//!               online → offline before it fires cancels it
//! retry         after a run with failures, one timer for the earliest
//!               next_attempt_at
//! ```
//! There is no periodic polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::TerminalContext;
use crate::error::{AuthResult, RemoteError, SyncError, SyncResult};
use crate::network::Subscription;
use crate::remote::{CreditSubmission, SaleSubmission};
use crate::retry::RetryPolicy;
use tally_core::validation::{validate_new_credit, validate_new_sale};
use tally_core::{CachedWorker, NewCredit, NewSale, QueueKind, SyncState};

// =============================================================================
// Run Results
// =============================================================================

/// Why `sync_now` did not start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    AlreadyRunning,
}

/// Per-queue counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Acknowledged by the server during this run.
    pub synced: u32,
    /// Submission failed; retry scheduled.
    pub failed: u32,
    /// Skipped because `next_attempt_at` is still in the future.
    pub deferred: u32,
    /// Skipped because `max_attempts` was reached.
    pub parked: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub sales: QueueStats,
    pub credits: QueueStats,
    /// SyncState as persisted at the end of the run.
    pub state: SyncState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(RunReport),
    Skipped { reason: SkipReason },
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives sync status updates (implemented by the terminal UI bridge).
pub trait SyncEventEmitter: Send + Sync {
    /// Emits the state persisted after a run or after queueing a record.
    fn emit_status(&self, state: &SyncState);

    /// Emits Idle → Running and Running → Idle.
    fn emit_running(&self, running: bool);

    /// Emits one failed submission.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for testing and headless use.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _state: &SyncState) {}
    fn emit_running(&self, _running: bool) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Sync Manager
// =============================================================================

struct ManagerInner {
    ctx: TerminalContext,
    policy: RetryPolicy,
    emitter: Arc<dyn SyncEventEmitter>,
    /// Idle (false) / Running (true).
    running: AtomicBool,
    reconnect_timer: Mutex<Option<JoinHandle<()>>>,
    retry_timer: Mutex<Option<JoinHandle<()>>>,
}

/// Background synchronization of the outbound queues.
///
/// Cloning yields another handle to the same manager (same guard, same
/// timers).
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("running", &self.is_running())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

/// Returns the manager to Idle on every exit path, including panics.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncManager {
    pub fn new(ctx: TerminalContext) -> Self {
        Self::with_emitter(ctx, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(ctx: TerminalContext, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        let policy = RetryPolicy::from_settings(&ctx.config.sync);
        SyncManager {
            inner: Arc::new(ManagerInner {
                ctx,
                policy,
                emitter,
                running: AtomicBool::new(false),
                reconnect_timer: Mutex::new(None),
                retry_timer: Mutex::new(None),
            }),
        }
    }

    fn ctx(&self) -> &TerminalContext {
        &self.inner.ctx
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    // =========================================================================
    // Run
    // =========================================================================

    /// Runs one pass over both queues, unless offline or already running.
    ///
    /// Per-record submission failures never make this return `Err`; only
    /// local store failures do.
    pub async fn sync_now(&self) -> SyncResult<SyncOutcome> {
        if !self.ctx().monitor.current_status() {
            debug!("Sync skipped: offline");
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::Offline,
            });
        }

        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync skipped: a run is already in progress");
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::AlreadyRunning,
            });
        }
        let outcome = {
            let _guard = RunningGuard(&self.inner.running);

            info!("Sync run started");
            self.inner.emitter.emit_running(true);

            match self.run_pass().await {
                Ok(report) => {
                    info!(
                        sales_synced = report.sales.synced,
                        sales_failed = report.sales.failed,
                        credits_synced = report.credits.synced,
                        credits_failed = report.credits.failed,
                        pending = report.state.pending_total(),
                        "Sync run finished"
                    );
                    Ok(SyncOutcome::Completed(report))
                }
                Err(e) => {
                    error!(error = %e, "Sync run aborted by local store failure");
                    if let Err(state_err) = self.recompute_state(Some(e.to_string())).await {
                        warn!(error = %state_err, "Could not record sync state after failed run");
                    }
                    Err(e)
                }
            }
        };
        self.inner.emitter.emit_running(false);

        // After the guard drops: a zero-delay retry must not see AlreadyRunning.
        if outcome.is_ok() {
            if let Err(e) = self.schedule_retry_run().await {
                warn!(error = %e, "Could not schedule retry run");
            }
        }

        outcome
    }

    async fn run_pass(&self) -> SyncResult<RunReport> {
        let started = Utc::now();
        let mut last_error = None;

        let sales = self.sweep_sales(started, &mut last_error).await?;
        let credits = self.sweep_credits(started, &mut last_error).await?;

        let state = self.recompute_state(last_error).await?;

        Ok(RunReport {
            sales,
            credits,
            state,
        })
    }

    async fn sweep_sales(
        &self,
        now: DateTime<Utc>,
        last_error: &mut Option<String>,
    ) -> SyncResult<QueueStats> {
        let ctx = self.ctx();
        let repo = ctx.db.sales();
        let mut stats = QueueStats::default();

        for sale in repo.query_unsynced().await? {
            if self.inner.policy.is_exhausted(sale.sync_attempts) {
                stats.parked += 1;
                continue;
            }
            if !sale.is_due(now) {
                stats.deferred += 1;
                continue;
            }

            let submission = SaleSubmission::from_queued(ctx.config.terminal_id(), &sale);
            match ctx.remote.create_sale(&submission).await {
                Ok(server_id) => {
                    repo.mark_synced(sale.local_id, &server_id).await?;
                    debug!(local_id = sale.local_id, server_id = %server_id, "Sale synced");
                    stats.synced += 1;
                }
                Err(e) => {
                    let attempts = sale.sync_attempts + 1;
                    let next = self.inner.policy.next_attempt_at(attempts, Utc::now());
                    repo.record_failure(sale.local_id, next).await?;
                    self.report_failure(QueueKind::Sales, sale.local_id, attempts, &e, last_error);
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn sweep_credits(
        &self,
        now: DateTime<Utc>,
        last_error: &mut Option<String>,
    ) -> SyncResult<QueueStats> {
        let ctx = self.ctx();
        let repo = ctx.db.credits();
        let mut stats = QueueStats::default();

        for credit in repo.query_unsynced().await? {
            if self.inner.policy.is_exhausted(credit.sync_attempts) {
                stats.parked += 1;
                continue;
            }
            if !credit.is_due(now) {
                stats.deferred += 1;
                continue;
            }

            let submission = CreditSubmission::from_queued(ctx.config.terminal_id(), &credit);
            match ctx.remote.create_credit(&submission).await {
                Ok(server_id) => {
                    repo.mark_synced(credit.local_id, &server_id).await?;
                    debug!(local_id = credit.local_id, server_id = %server_id, "Credit synced");
                    stats.synced += 1;
                }
                Err(e) => {
                    let attempts = credit.sync_attempts + 1;
                    let next = self.inner.policy.next_attempt_at(attempts, Utc::now());
                    repo.record_failure(credit.local_id, next).await?;
                    self.report_failure(QueueKind::Credits, credit.local_id, attempts, &e, last_error);
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    fn report_failure(
        &self,
        kind: QueueKind,
        local_id: i64,
        attempts: i64,
        err: &RemoteError,
        last_error: &mut Option<String>,
    ) {
        let retryable = err.is_retryable();
        warn!(
            queue = %kind,
            local_id,
            attempts,
            retryable,
            error = %err,
            "Submission failed, retry scheduled"
        );
        if self.inner.policy.is_exhausted(attempts) {
            warn!(queue = %kind, local_id, attempts, "Record reached max attempts and is parked");
        }

        let message = format!("{kind} #{local_id}: {err}");
        self.inner.emitter.emit_error(&message, retryable);
        *last_error = Some(message);
    }

    /// Fresh counts → SyncState, persisted and emitted.
    async fn recompute_state(&self, last_error: Option<String>) -> SyncResult<SyncState> {
        let db = &self.ctx().db;
        let state = SyncState {
            last_sync_time: Some(Utc::now()),
            pending_sales_count: db.sales().count_unsynced().await?,
            pending_credits_count: db.credits().count_unsynced().await?,
            last_error,
        };
        db.sync_state().save(&state).await?;
        self.inner.emitter.emit_status(&state);
        Ok(state)
    }

    /// Refreshes only the pending counters, keeping the last run's outcome.
    async fn refresh_pending_counts(&self) -> SyncResult<SyncState> {
        let db = &self.ctx().db;
        let mut state = db.sync_state().load().await?;
        state.pending_sales_count = db.sales().count_unsynced().await?;
        state.pending_credits_count = db.credits().count_unsynced().await?;
        db.sync_state().save(&state).await?;
        self.inner.emitter.emit_status(&state);
        Ok(state)
    }

    /// Earliest future `next_attempt_at` among retryable records.
    async fn earliest_retry(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let db = &self.ctx().db;
        let policy = self.inner.policy;

        let sales = db.sales().query_unsynced().await?;
        let credits = db.credits().query_unsynced().await?;

        let earliest = sales
            .iter()
            .filter(|s| !policy.is_exhausted(s.sync_attempts))
            .filter_map(|s| s.next_attempt_at)
            .chain(
                credits
                    .iter()
                    .filter(|c| !policy.is_exhausted(c.sync_attempts))
                    .filter_map(|c| c.next_attempt_at),
            )
            .min();

        Ok(earliest)
    }

    async fn schedule_retry_run(&self) -> SyncResult<()> {
        let Some(at) = self.earliest_retry().await? else {
            return Ok(());
        };

        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(delay_ms = delay.as_millis() as u64, "Retry run scheduled");

        let handle = spawn_delayed_run(Arc::downgrade(&self.inner), delay, &Handle::current());
        replace_timer(&self.inner.retry_timer, Some(handle));
        Ok(())
    }

    // =========================================================================
    // Reconnect Scheduling
    // =========================================================================

    /// Arms the reconnect timer; a run starts after `reconnect_delay`.
    ///
    /// Re-arming replaces (and cancels) the previous timer.
    pub fn schedule_sync(&self) -> SyncResult<()> {
        let runtime = Handle::try_current()
            .map_err(|e| SyncError::Internal(format!("no async runtime: {e}")))?;
        self.arm_reconnect_timer(&runtime);
        Ok(())
    }

    fn arm_reconnect_timer(&self, runtime: &Handle) {
        let delay = self.ctx().config.sync.reconnect_delay();
        let handle = spawn_delayed_run(Arc::downgrade(&self.inner), delay, runtime);
        replace_timer(&self.inner.reconnect_timer, Some(handle));
        debug!(delay_ms = delay.as_millis() as u64, "Reconnect sync scheduled");
    }

    /// Cancels a pending reconnect run. Returns `true` if one was pending.
    ///
    /// A run that already started is not affected.
    pub fn cancel_scheduled_sync(&self) -> bool {
        let cancelled = replace_timer(&self.inner.reconnect_timer, None);
        if cancelled {
            debug!("Reconnect sync cancelled");
        }
        cancelled
    }

    /// True while a reconnect timer is counting down.
    pub fn has_scheduled_sync(&self) -> bool {
        self.inner
            .reconnect_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Subscribes to the monitor: online arms the reconnect timer, offline
    /// cancels it.
    ///
    /// Must be called inside a tokio runtime; callbacks may then fire from
    /// any thread.
    pub fn attach(&self) -> SyncResult<Subscription> {
        let runtime = Handle::try_current()
            .map_err(|e| SyncError::Internal(format!("no async runtime: {e}")))?;
        let manager = Arc::downgrade(&self.inner);

        let subscription = self.ctx().monitor.subscribe(move |online| {
            let Some(inner) = manager.upgrade() else {
                return;
            };
            let manager = SyncManager { inner };
            if online {
                manager.arm_reconnect_timer(&runtime);
            } else {
                manager.cancel_scheduled_sync();
            }
        });

        info!("Sync manager attached to network monitor");
        Ok(subscription)
    }

    // =========================================================================
    // Queueing
    // =========================================================================

    /// Validates and queues a sale; starts a background run if online.
    pub async fn record_sale(&self, sale: NewSale) -> SyncResult<i64> {
        validate_new_sale(&sale)?;
        let local_id = self.ctx().db.sales().append(&sale).await?;
        info!(
            local_id,
            total = %sale.total_price(),
            partial = sale.is_partial(),
            "Sale recorded"
        );

        self.note_queued(QueueKind::Sales, local_id).await;
        self.trigger_background_run();
        Ok(local_id)
    }

    /// Validates and queues a credit; starts a background run if online.
    pub async fn record_credit(&self, credit: NewCredit) -> SyncResult<i64> {
        validate_new_credit(&credit)?;
        let local_id = self.ctx().db.credits().append(&credit).await?;
        info!(local_id, owed = credit.total_owed_cents, "Credit recorded");

        self.note_queued(QueueKind::Credits, local_id).await;
        self.trigger_background_run();
        Ok(local_id)
    }

    /// The record is already committed, so a counter failure is only logged;
    /// the next run recomputes the counts.
    async fn note_queued(&self, kind: QueueKind, local_id: i64) {
        if let Err(e) = self.refresh_pending_counts().await {
            warn!(queue = %kind, local_id, error = %e, "Pending counts not refreshed");
        }
    }

    fn trigger_background_run(&self) {
        if !self.ctx().monitor.current_status() {
            return;
        }
        let manager = self.clone();
        tokio::spawn(async move { manager.run_logged().await });
    }

    async fn run_logged(&self) {
        if let Err(e) = self.sync_now().await {
            error!(error = %e, "Background sync run failed");
        }
    }

    // =========================================================================
    // Cache Refresh
    // =========================================================================

    /// Replaces the product cache with the server catalog.
    pub async fn refresh_products(&self) -> SyncResult<usize> {
        let ctx = self.ctx();
        if !ctx.monitor.current_status() {
            return Err(SyncError::Offline);
        }

        let fetched_at = Utc::now();
        let products: Vec<_> = ctx
            .remote
            .list_products(ctx.config.store_id())
            .await?
            .into_iter()
            .map(|p| p.into_cached(fetched_at))
            .collect();

        ctx.db.products().replace_all(&products).await?;
        info!(count = products.len(), "Product cache refreshed");
        Ok(products.len())
    }

    /// Replaces the worker cache with the server list, hashing any PIN that
    /// arrives in plaintext.
    pub async fn refresh_workers(&self) -> SyncResult<usize> {
        let ctx = self.ctx();
        if !ctx.monitor.current_status() {
            return Err(SyncError::Offline);
        }

        let remote_workers = ctx.remote.list_workers(ctx.config.store_id()).await?;
        let hasher = ctx.hasher.clone();
        let fetched_at = Utc::now();

        let workers = tokio::task::spawn_blocking(move || {
            remote_workers
                .into_iter()
                .map(|w| -> AuthResult<CachedWorker> {
                    let hash = hasher.to_cached(&w.pin)?;
                    Ok(w.into_cached(hash, fetched_at))
                })
                .collect::<AuthResult<Vec<_>>>()
        })
        .await
        .map_err(|e| SyncError::Internal(format!("PIN hashing task failed: {e}")))??;

        ctx.db.workers().replace_all(&workers).await?;
        info!(count = workers.len(), "Worker cache refreshed");
        Ok(workers.len())
    }

    /// Current sync health, as last persisted.
    pub async fn status(&self) -> SyncResult<SyncState> {
        Ok(self.ctx().db.sync_state().load().await?)
    }
}

/// Spawns a timer that starts a run after `delay`.
///
/// Only the sleep is cancellable: the run itself is spawned as its own task,
/// so aborting the timer never interrupts a run.
fn spawn_delayed_run(
    manager: Weak<ManagerInner>,
    delay: Duration,
    runtime: &Handle,
) -> JoinHandle<()> {
    let runtime_for_run = runtime.clone();
    runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(inner) = manager.upgrade() {
            let manager = SyncManager { inner };
            runtime_for_run.spawn(async move { manager.run_logged().await });
        }
    })
}

/// Swaps the timer in `slot`, aborting the old one.
/// Returns `true` if the old timer was still pending.
fn replace_timer(slot: &Mutex<Option<JoinHandle<()>>>, new: Option<JoinHandle<()>>) -> bool {
    let old = std::mem::replace(
        &mut *slot.lock().unwrap_or_else(PoisonError::into_inner),
        new,
    );
    match old {
        Some(handle) => {
            let pending = !handle.is_finished();
            handle.abort();
            pending
        }
        None => false,
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        for slot in [&self.reconnect_timer, &self.retry_timer] {
            if let Some(handle) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_guard_resets_flag() {
        let flag = AtomicBool::new(true);
        {
            let _guard = RunningGuard(&flag);
        }
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_replace_timer_reports_pending() {
        let slot = Mutex::new(None);
        assert!(!replace_timer(&slot, None));

        let pending = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        assert!(!replace_timer(&slot, Some(pending)));
        assert!(replace_timer(&slot, None));
        assert!(slot.lock().unwrap().is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let skipped = SyncOutcome::Skipped {
            reason: SkipReason::AlreadyRunning,
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "already_running");
        assert!(!skipped.is_completed());
    }
}
