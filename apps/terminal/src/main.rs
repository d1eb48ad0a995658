//! # Tally Terminal
//!
//! Headless daemon that keeps a till's offline layer running.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Initialize Logging                                                  │
//! │     • tracing-subscriber with env filter (RUST_LOG overrides)           │
//! │                                                                         │
//! │  2. Load Config                                                         │
//! │     • argv[1] or the platform config dir, then TALLY_* overrides        │
//! │                                                                         │
//! │  3. Open Context                                                        │
//! │     • SQLite store (migrations applied), HTTP remote                    │
//! │                                                                         │
//! │  4. Wire Engine                                                         │
//! │     • SyncManager attached to NetworkMonitor (reconnect timer)          │
//! │     • Health probe drives the monitor                                   │
//! │     • Product and worker caches refreshed once                          │
//! │     • Pending queue drained once                                        │
//! │                                                                         │
//! │  5. Wait for Ctrl-C, then detach and close the store                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tally_core::SyncState;
use tally_sync::{spawn_probe, SyncEventEmitter, SyncManager, TerminalConfig, TerminalContext};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Forwards sync events to the log until a UI is attached.
struct LogEmitter;

impl SyncEventEmitter for LogEmitter {
    fn emit_status(&self, state: &SyncState) {
        info!(
            pending_sales = state.pending_sales_count,
            pending_credits = state.pending_credits_count,
            last_error = state.last_error.as_deref().unwrap_or(""),
            "Sync status"
        );
    }

    fn emit_running(&self, running: bool) {
        info!(running, "Sync running state changed");
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        warn!(retryable, "{message}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Tally terminal");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = TerminalConfig::load_or_init(config_path).context("loading terminal config")?;

    let ctx = TerminalContext::open(config, None)
        .await
        .context("opening terminal store")?;

    let manager = SyncManager::with_emitter(ctx.clone(), Arc::new(LogEmitter));
    let subscription = manager.attach()?;
    let probe = spawn_probe(
        ctx.monitor.clone(),
        ctx.remote.clone(),
        ctx.config.sync.probe_interval(),
    );

    warm_caches(&manager).await;

    match manager.sync_now().await {
        Ok(outcome) => info!(?outcome, "Startup sync finished"),
        Err(e) => error!(error = %e, "Startup sync failed"),
    }

    info!(terminal_id = %ctx.config.terminal_id(), "Terminal ready");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutting down");
    subscription.unsubscribe();
    manager.cancel_scheduled_sync();
    probe.abort();
    ctx.db.close().await;

    Ok(())
}

/// Refreshes the product and worker caches; failures leave the previous
/// snapshot in place.
async fn warm_caches(manager: &SyncManager) {
    match manager.refresh_products().await {
        Ok(count) => info!(count, "Products cached"),
        Err(e) => warn!(error = %e, "Product cache not refreshed"),
    }

    match manager.refresh_workers().await {
        Ok(count) => info!(count, "Workers cached"),
        Err(e) => warn!(error = %e, "Worker cache not refreshed"),
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tally_sync=trace` - Trace the offline engine only
/// - Default: INFO, DEBUG for the tally crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally_sync=debug,tally_db=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();
}
