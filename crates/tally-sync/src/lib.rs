//! # tally-sync: Offline Engine for the Tally Terminal
//!
//! Keeps the terminal selling while the store server is unreachable: sales
//! and credits are committed locally first, drained to the server when the
//! connection returns, and workers can still log in against a cached PIN
//! list.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Offline Engine                           │
//! │                                                                         │
//! │   platform events / health probe                                       │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  ┌──────────────────┐  edges   ┌──────────────────┐                     │
//! │  │  NetworkMonitor  │─────────►│   SyncManager    │                     │
//! │  │  current_status  │          │  Idle ⇄ Running  │                     │
//! │  │  subscribe       │          │  debounced timer │                     │
//! │  └──────────────────┘          └────────┬─────────┘                     │
//! │            │                            │ create_sale / create_credit   │
//! │            │                            ▼                               │
//! │            │                   ┌──────────────────┐                     │
//! │            │                   │    RemoteApi     │◄──── HttpRemote     │
//! │            │                   └──────────────────┘      (reqwest)      │
//! │            │                            ▲ verify_pin                    │
//! │            ▼                            │                               │
//! │  ┌──────────────────────────────────────┴──┐                            │
//! │  │        OfflineAuthenticator             │                            │
//! │  │  server first, else argon2 over cache   │                            │
//! │  └─────────────────────────────────────────┘                            │
//! │                                                                         │
//! │  All of the above share one TerminalContext (db, monitor, remote,       │
//! │  hasher, config). No process-wide state.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`auth`] - PIN verification and worker sessions
//! - [`config`] - Terminal configuration (TOML + env overrides)
//! - [`context`] - `TerminalContext` shared by every component
//! - [`error`] - Engine error types
//! - [`http`] - reqwest implementation of [`RemoteApi`]
//! - [`manager`] - `SyncManager` (single-flight runs, reconnect timer)
//! - [`network`] - `NetworkMonitor` and the health probe
//! - [`pin`] - Argon2 PIN hashing
//! - [`remote`] - Server contract and wire types
//! - [`retry`] - Per-record retry policy
//!
//! ## Usage
//! ```rust,ignore
//! let ctx = TerminalContext::open(TerminalConfig::load(None)?, None).await?;
//!
//! let manager = ctx.sync_manager();
//! let _subscription = manager.attach()?;
//!
//! manager.record_sale(sale).await?;
//!
//! let outcome = ctx
//!     .authenticator()
//!     .verify_pin(PinRequest::for_store(&ctx, "1234"))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod manager;
pub mod network;
pub mod pin;
pub mod remote;
pub mod retry;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{OfflineAuthenticator, PinOutcome, PinRequest};
pub use config::TerminalConfig;
pub use context::TerminalContext;
pub use error::{AuthError, AuthResult, RemoteError, RemoteResult, SyncError, SyncResult};
pub use http::HttpRemote;
pub use manager::{
    NoOpEmitter, QueueStats, RunReport, SkipReason, SyncEventEmitter, SyncManager, SyncOutcome,
};
pub use network::{spawn_probe, NetworkMonitor, Subscription};
pub use pin::PinHasher;
pub use remote::RemoteApi;
pub use retry::RetryPolicy;
