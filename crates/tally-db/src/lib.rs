//! # tally-db: Local Persistent Store
//!
//! Durable SQLite storage for the terminal's offline layer. Everything that
//! must survive a restart while the server is unreachable lives here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  tally-sync (SyncManager, OfflineAuthenticator)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌─────────────┐ │   │
//! │  │   │   Database    │    │    Repositories    │  │ Migrations  │ │   │
//! │  │   │   (pool.rs)   │◄───│ sales, credits     │  │ (embedded)  │ │   │
//! │  │   │  SqlitePool   │    │ products, workers  │  │             │ │   │
//! │  │   │               │    │ sync_state, session│  │             │ │   │
//! │  │   └───────────────┘    └────────────────────┘  └─────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  terminal.db (platform data directory)                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("terminal.db")).await?;
//!
//! let local_id = db.sales().append(&sale).await?;
//! let pending = db.sales().query_unsynced().await?;
//! db.sales().mark_synced(local_id, "srv-812").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::credit::CreditQueueRepository;
pub use repository::product::ProductCacheRepository;
pub use repository::sale::SaleQueueRepository;
pub use repository::session::SessionRepository;
pub use repository::sync::SyncStateRepository;
pub use repository::worker::WorkerCacheRepository;
