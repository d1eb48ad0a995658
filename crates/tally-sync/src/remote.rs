//! # Remote Server Contract
//!
//! The minimal set of calls the offline engine needs from the store server.
//! [`HttpRemote`](crate::http::HttpRemote) is the production implementation;
//! tests substitute their own.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_sale    POST /api/sales                  → { "id": "..." }      │
//! │  create_credit  POST /api/credits                → { "id": "..." }      │
//! │  list_workers   GET  /api/stores/{store}/workers → [RemoteWorker]       │
//! │  list_products  GET  /api/stores/{store}/products→ [RemoteProduct]      │
//! │  verify_pin     POST /api/workers/verify-pin     → WorkerIdentity       │
//! │  health         HEAD /api/health                 → 2xx                  │
//! │                                                                         │
//! │  All calls: Authorization: Bearer <store session token>                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Create calls carry an `idempotency_key` (`{terminal}:{kind}:{local_id}`).
//! A record that was accepted but whose acknowledgment was lost is sent
//! again with the same key; the server is expected to return the original id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RemoteResult;
use tally_core::{
    CachedProduct, CachedWorker, QueueKind, QueuedCredit, QueuedSale, SaleLine, WorkerIdentity,
};

// =============================================================================
// Trait
// =============================================================================

/// Server operations used by the sync manager and the authenticator.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Submits a queued sale; returns the server-assigned id.
    async fn create_sale(&self, sale: &SaleSubmission) -> RemoteResult<String>;

    /// Submits a queued credit; returns the server-assigned id.
    async fn create_credit(&self, credit: &CreditSubmission) -> RemoteResult<String>;

    /// All workers of the store, including their PIN value.
    async fn list_workers(&self, store_id: &str) -> RemoteResult<Vec<RemoteWorker>>;

    /// The store catalog.
    async fn list_products(&self, store_id: &str) -> RemoteResult<Vec<RemoteProduct>>;

    /// Server-side PIN check, authenticated with the given store token.
    async fn verify_pin(
        &self,
        request: &PinVerifyRequest,
        store_token: &str,
    ) -> RemoteResult<WorkerIdentity>;

    /// Cheap reachability check.
    async fn health(&self) -> RemoteResult<()>;
}

// =============================================================================
// Submissions
// =============================================================================

pub fn idempotency_key(terminal_id: &str, kind: QueueKind, local_id: i64) -> String {
    format!("{terminal_id}:{kind}:{local_id}")
}

/// Body of `POST /api/sales`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleSubmission {
    pub idempotency_key: String,
    pub terminal_id: String,
    pub local_id: i64,
    pub worker_id: String,
    pub items: Vec<SaleLine>,
    pub total_price_cents: i64,
    pub total_cost_cents: i64,
    pub amount_paid_cents: i64,
    pub is_partial: bool,
    pub created_at: DateTime<Utc>,
}

impl SaleSubmission {
    pub fn from_queued(terminal_id: &str, sale: &QueuedSale) -> Self {
        SaleSubmission {
            idempotency_key: idempotency_key(terminal_id, QueueKind::Sales, sale.local_id),
            terminal_id: terminal_id.to_string(),
            local_id: sale.local_id,
            worker_id: sale.worker_id.clone(),
            items: sale.items.clone(),
            total_price_cents: sale.total_price_cents,
            total_cost_cents: sale.total_cost_cents,
            amount_paid_cents: sale.amount_paid_cents,
            is_partial: sale.is_partial,
            created_at: sale.created_at,
        }
    }
}

/// Body of `POST /api/credits`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditSubmission {
    pub idempotency_key: String,
    pub terminal_id: String,
    pub local_id: i64,
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub total_owed_cents: i64,
    pub amount_paid_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl CreditSubmission {
    pub fn from_queued(terminal_id: &str, credit: &QueuedCredit) -> Self {
        CreditSubmission {
            idempotency_key: idempotency_key(terminal_id, QueueKind::Credits, credit.local_id),
            terminal_id: terminal_id.to_string(),
            local_id: credit.local_id,
            customer_name: credit.customer_name.clone(),
            phone_number: credit.phone_number.clone(),
            total_owed_cents: credit.total_owed_cents,
            amount_paid_cents: credit.amount_paid_cents,
            created_at: credit.created_at,
        }
    }
}

/// `{ "id": "..." }` returned by the create endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Created {
    pub id: String,
}

/// Body of `POST /api/workers/verify-pin`.
#[derive(Debug, Clone, Serialize)]
pub struct PinVerifyRequest {
    pub pin: String,
    pub store_id: String,
}

// =============================================================================
// Snapshots
// =============================================================================

/// A worker as listed by the server.
///
/// `pin` is whatever the server stores: either a PHC hash or a raw PIN.
/// It is never cached as-is; see [`crate::pin::PinHasher::to_cached`].
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteWorker {
    #[serde(alias = "id")]
    pub worker_id: String,
    pub name: String,
    #[serde(alias = "pin_hash")]
    pub pin: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A catalog product as listed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProduct {
    #[serde(alias = "id")]
    pub product_id: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub cost_price_cents: i64,
    pub selling_price_cents: i64,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default = "default_unit")]
    pub unit_name: String,
    #[serde(default)]
    pub bulk_quantity: Option<i64>,
    #[serde(default)]
    pub bulk_price_cents: Option<i64>,
}

fn default_unit() -> String {
    "pcs".to_string()
}

impl RemoteProduct {
    pub fn into_cached(self, fetched_at: DateTime<Utc>) -> CachedProduct {
        CachedProduct {
            product_id: self.product_id,
            name: self.name,
            brand: self.brand,
            category: self.category,
            cost_price_cents: self.cost_price_cents,
            selling_price_cents: self.selling_price_cents,
            quantity: self.quantity,
            unit_name: self.unit_name,
            bulk_quantity: self.bulk_quantity,
            bulk_price_cents: self.bulk_price_cents,
            last_updated: fetched_at,
        }
    }
}

impl RemoteWorker {
    /// Converts to a cache row with an already-hashed PIN.
    pub fn into_cached(self, pin_hash: String, fetched_at: DateTime<Utc>) -> CachedWorker {
        CachedWorker {
            worker_id: self.worker_id,
            name: self.name,
            pin_hash,
            created_at: self.created_at.unwrap_or(fetched_at),
            last_synced: fetched_at,
        }
    }
}
