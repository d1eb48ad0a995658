//! # Terminal Context
//!
//! Everything a component needs, passed explicitly instead of living in
//! process-wide statics. Two contexts never share state, so several
//! terminals can run side by side in one test process.
//!
//! `ctx.sync_manager()` and `ctx.authenticator()` build the two engines over
//! the same store, monitor and remote.

use std::path::PathBuf;
use std::sync::Arc;

use tally_db::{Database, DbConfig};
use tracing::info;

use crate::auth::OfflineAuthenticator;
use crate::config::TerminalConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpRemote;
use crate::manager::SyncManager;
use crate::network::NetworkMonitor;
use crate::pin::PinHasher;
use crate::remote::RemoteApi;

#[derive(Clone)]
pub struct TerminalContext {
    pub db: Database,
    pub monitor: NetworkMonitor,
    pub remote: Arc<dyn RemoteApi>,
    pub hasher: PinHasher,
    pub config: Arc<TerminalConfig>,
}

impl std::fmt::Debug for TerminalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalContext")
            .field("terminal_id", &self.config.terminal_id())
            .field("store_id", &self.config.store_id())
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl TerminalContext {
    pub fn new(
        db: Database,
        monitor: NetworkMonitor,
        remote: Arc<dyn RemoteApi>,
        config: TerminalConfig,
    ) -> SyncResult<Self> {
        config.validate()?;
        let hasher = PinHasher::from_settings(&config.auth)?;

        Ok(TerminalContext {
            db,
            monitor,
            remote,
            hasher,
            config: Arc::new(config),
        })
    }

    /// Opens the production context: SQLite file plus HTTP remote.
    ///
    /// `database_path` defaults to the platform data directory.
    pub async fn open(config: TerminalConfig, database_path: Option<PathBuf>) -> SyncResult<Self> {
        let path = database_path
            .or_else(TerminalConfig::default_database_path)
            .ok_or_else(|| SyncError::InvalidConfig("No data directory available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(
            terminal_id = %config.terminal_id(),
            store_id = %config.store_id(),
            path = %path.display(),
            "Opening terminal context"
        );

        let db = Database::new(DbConfig::new(path)).await?;
        let remote = HttpRemote::from_config(&config)?;

        Self::new(db, NetworkMonitor::new(), Arc::new(remote), config)
    }

    pub fn sync_manager(&self) -> SyncManager {
        SyncManager::new(self.clone())
    }

    pub fn authenticator(&self) -> OfflineAuthenticator {
        OfflineAuthenticator::new(self.clone())
    }
}
