//! # Database Pool Management
//!
//! Connection pool creation and configuration for the terminal's SQLite file.
//!
//! `Database::new` opens the pool and applies migrations; each accessor
//! (`sales()`, `workers()`, ...) returns a repository over a clone of the pool.
//!
//! ## WAL Mode
//! WAL is enabled so the sync run can write acknowledgments while the till
//! keeps reading the product cache.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::credit::CreditQueueRepository;
use crate::repository::product::ProductCacheRepository;
use crate::repository::sale::SaleQueueRepository;
use crate::repository::session::SessionRepository;
use crate::repository::sync::SyncStateRepository;
use crate::repository::worker::WorkerCacheRepository;

// =============================================================================
// Configuration
// =============================================================================

const MEMORY_PATH: &str = ":memory:";

/// Local store settings.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/tally/terminal.db")
///     .max_connections(4)
///     .busy_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:`.
    pub database_path: PathBuf,

    /// Pool ceiling. Default: 5
    pub max_connections: u32,

    /// Connections kept open. Default: 1
    pub min_connections: u32,

    /// How long a caller waits for a free connection. Default: 30 s
    pub connect_timeout: Duration,

    /// How long a writer waits on a locked file before `SQLITE_BUSY`.
    /// Default: 5 s
    pub busy_timeout: Duration,

    /// `None` keeps idle connections forever. Default: 10 min
    pub idle_timeout: Option<Duration>,

    /// Apply pending migrations when opening. Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed store at `path`, created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    /// Private in-memory store, one per call.
    ///
    /// Exactly one connection that is never reaped: closing it would discard
    /// the data.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            ..DbConfig::new(MEMORY_PATH)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let base = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        Ok(base
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout))
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the terminal's local store.
///
/// Cloning is cheap; every clone shares one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and applies migrations (if enabled).
    ///
    /// ## SQLite Settings
    /// - WAL journal (file stores)
    /// - NORMAL synchronous
    /// - Foreign keys on (items cascade with their sale)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening local store");

        let options = config.connect_options()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(
            max_connections = config.max_connections,
            in_memory = config.is_in_memory(),
            "Local store pool ready"
        );

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Applies pending migrations. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the sales queue.
    pub fn sales(&self) -> SaleQueueRepository {
        SaleQueueRepository::new(self.pool.clone())
    }

    /// Returns the credits queue.
    pub fn credits(&self) -> CreditQueueRepository {
        CreditQueueRepository::new(self.pool.clone())
    }

    /// Returns the product cache.
    pub fn products(&self) -> ProductCacheRepository {
        ProductCacheRepository::new(self.pool.clone())
    }

    /// Returns the worker cache.
    pub fn workers(&self) -> WorkerCacheRepository {
        WorkerCacheRepository::new(self.pool.clone())
    }

    /// Returns the sync state singleton.
    pub fn sync_state(&self) -> SyncStateRepository {
        SyncStateRepository::new(self.pool.clone())
    }

    /// Returns the worker session store.
    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.pool.clone())
    }

    /// Closes the pool. Repository calls fail afterwards.
    pub async fn close(&self) {
        info!("Closing local store");
        self.pool.close().await;
    }

    /// True if the store answers a trivial query.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
