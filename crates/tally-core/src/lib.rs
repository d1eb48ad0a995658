//! # tally-core: Pure Domain Types for the Offline Terminal
//!
//! Everything the offline layer stores, queues or hands to the UI is defined
//! here, without a single I/O call.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Tally Terminal Offline Layer                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  tally-sync (engine)                            │   │
//! │  │   NetworkMonitor ── SyncManager ── OfflineAuthenticator         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  tally-db (local store)                         │   │
//! │  │   queued_sales, queued_credits, cached_products, ...            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                   │   │
//! │  │   │   types   │  │   money   │  │ validation│                   │   │
//! │  │   │ QueuedSale│  │   Money   │  │ PIN, sale │                   │   │
//! │  │   │ SyncState │  │           │  │ credit    │                   │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Queued records, cache snapshots, sync state, sessions
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation for sales, credits and PINs
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::{NewSale, SaleLine};
//!
//! let sale = NewSale::new(
//!     "worker-7",
//!     vec![SaleLine::new("prod-1", 2, 250, 150)],
//!     300,
//! );
//!
//! assert_eq!(sale.total_price().cents(), 500);
//! assert!(sale.is_partial());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines accepted in a single queued sale.
pub const MAX_SALE_LINES: usize = 200;

/// Maximum quantity on a single sale line.
///
/// Catches typos such as 1000 instead of 10 before they are queued.
pub const MAX_LINE_QUANTITY: i64 = 9_999;

/// Largest single money amount accepted, in cents (one billion major units).
///
/// Keeps the worst-case sale total (`MAX_SALE_LINES` x `MAX_LINE_QUANTITY`
/// x this) inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;
