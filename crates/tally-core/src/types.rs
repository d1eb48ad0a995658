//! # Domain Types
//!
//! Records owned by the terminal's offline layer.
//!
//! ## Record Lifecycles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  QUEUED (sales, credits) - owned by the terminal until acknowledged     │
//! │                                                                         │
//! │    NewSale ──append──► QueuedSale { synced: false, server_id: None }    │
//! │                              │                                          │
//! │                  server ack  │  mark_synced(local_id, server_id)        │
//! │                              ▼                                          │
//! │                        QueuedSale { synced: true, server_id: Some }     │
//! │                                                                         │
//! │  CACHED (products, workers) - read-only snapshots of the server        │
//! │                                                                         │
//! │    server list ──replace_all──► whole collection swapped at once        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `synced == true` always implies `server_id.is_some()`. The converse is
//! never true: a server id is only ever written together with the flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Queue Kind
// =============================================================================

/// The two outbound queues drained by the sync manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Sales,
    Credits,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKind::Sales => write!(f, "sales"),
            QueueKind::Credits => write!(f, "credits"),
        }
    }
}

// =============================================================================
// Sale Line
// =============================================================================

/// One line of a sale, with prices frozen at the time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    /// Server product identifier.
    pub product_id: String,
    /// Quantity sold.
    pub quantity: i64,
    /// Selling price per unit, in cents.
    pub unit_price_cents: i64,
    /// Cost price per unit, in cents (for margin reporting on the server).
    pub cost_price_cents: i64,
}

impl SaleLine {
    pub fn new(
        product_id: impl Into<String>,
        quantity: i64,
        unit_price_cents: i64,
        cost_price_cents: i64,
    ) -> Self {
        SaleLine {
            product_id: product_id.into(),
            quantity,
            unit_price_cents,
            cost_price_cents,
        }
    }

    /// Selling price × quantity.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).times(self.quantity)
    }

    /// Cost price × quantity.
    #[inline]
    pub fn line_cost(&self) -> Money {
        Money::from_cents(self.cost_price_cents).times(self.quantity)
    }
}

// =============================================================================
// New Sale / Queued Sale
// =============================================================================

/// A completed sale as captured at the till, before it is queued.
///
/// Totals and the partial-payment flag are derived from the lines and the
/// amount paid, so a queued record can never disagree with its own items.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    /// Worker who rang up the sale.
    pub worker_id: String,
    pub items: Vec<SaleLine>,
    /// Amount actually handed over, in cents.
    pub amount_paid_cents: i64,
}

impl NewSale {
    pub fn new(worker_id: impl Into<String>, items: Vec<SaleLine>, amount_paid_cents: i64) -> Self {
        NewSale {
            worker_id: worker_id.into(),
            items,
            amount_paid_cents,
        }
    }

    /// Sum of all line totals.
    pub fn total_price(&self) -> Money {
        self.items.iter().map(SaleLine::line_total).sum()
    }

    /// Sum of all line costs.
    pub fn total_cost(&self) -> Money {
        self.items.iter().map(SaleLine::line_cost).sum()
    }

    /// True when the customer paid less than the total.
    pub fn is_partial(&self) -> bool {
        self.amount_paid_cents < self.total_price().cents()
    }
}

/// A sale waiting in (or acknowledged from) the local sales queue.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueuedSale {
    /// Auto-assigned local identifier (insertion order).
    pub local_id: i64,
    pub items: Vec<SaleLine>,
    pub worker_id: String,
    pub total_price_cents: i64,
    pub total_cost_cents: i64,
    pub amount_paid_cents: i64,
    pub is_partial: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// Identifier assigned by the server on acknowledgment.
    pub server_id: Option<String>,
    pub synced: bool,
    /// Failed submissions so far.
    pub sync_attempts: i64,
    /// Earliest time the next submission may be attempted.
    #[ts(as = "Option<String>")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedSale {
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    /// What the customer still owes on this sale.
    pub fn balance_due(&self) -> Money {
        self.total_price().remaining_after(self.amount_paid())
    }

    /// True if the retry policy allows a submission at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.synced && self.next_attempt_at.map_or(true, |at| at <= now)
    }
}

// =============================================================================
// New Credit / Queued Credit
// =============================================================================

/// A customer credit (tab) opened at the till.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCredit {
    pub customer_name: String,
    pub phone_number: Option<String>,
    pub total_owed_cents: i64,
    pub amount_paid_cents: i64,
}

impl NewCredit {
    pub fn new(customer_name: impl Into<String>, total_owed_cents: i64) -> Self {
        NewCredit {
            customer_name: customer_name.into(),
            phone_number: None,
            total_owed_cents,
            amount_paid_cents: 0,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    pub fn with_amount_paid(mut self, cents: i64) -> Self {
        self.amount_paid_cents = cents;
        self
    }
}

/// A credit waiting in (or acknowledged from) the local credits queue.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct QueuedCredit {
    pub local_id: i64,
    pub customer_name: String,
    pub phone_number: Option<String>,
    pub total_owed_cents: i64,
    pub amount_paid_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub server_id: Option<String>,
    pub synced: bool,
    pub sync_attempts: i64,
    #[ts(as = "Option<String>")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedCredit {
    /// Outstanding balance on the credit.
    pub fn balance_due(&self) -> Money {
        Money::from_cents(self.total_owed_cents)
            .remaining_after(Money::from_cents(self.amount_paid_cents))
    }

    /// True if the retry policy allows a submission at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.synced && self.next_attempt_at.map_or(true, |at| at <= now)
    }
}

// =============================================================================
// Cached Product
// =============================================================================

/// Snapshot of a catalog product, refreshed wholesale from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CachedProduct {
    pub product_id: String,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub cost_price_cents: i64,
    pub selling_price_cents: i64,
    /// Stock on hand at the time of the snapshot.
    pub quantity: i64,
    /// Display unit ("pcs", "kg", "crate").
    pub unit_name: String,
    /// Minimum quantity for the bulk unit price to apply.
    pub bulk_quantity: Option<i64>,
    /// Unit price when buying at least `bulk_quantity`.
    pub bulk_price_cents: Option<i64>,
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

impl CachedProduct {
    /// Unit price for a line of `quantity`, honoring bulk pricing.
    ///
    /// ## Example
    /// ```rust
    /// # use tally_core::CachedProduct;
    /// # let mut p = CachedProduct {
    /// #     product_id: "p".into(), name: "Soda".into(), brand: None, category: None,
    /// #     cost_price_cents: 60, selling_price_cents: 100, quantity: 48,
    /// #     unit_name: "can".into(), bulk_quantity: Some(12), bulk_price_cents: Some(85),
    /// #     last_updated: chrono::Utc::now(),
    /// # };
    /// assert_eq!(p.unit_price_for(3).cents(), 100);
    /// assert_eq!(p.unit_price_for(12).cents(), 85);
    /// ```
    pub fn unit_price_for(&self, quantity: i64) -> Money {
        match (self.bulk_quantity, self.bulk_price_cents) {
            (Some(min), Some(price)) if min > 0 && quantity >= min => Money::from_cents(price),
            _ => Money::from_cents(self.selling_price_cents),
        }
    }

    /// Builds a sale line for this product at the applicable price.
    pub fn line(&self, quantity: i64) -> SaleLine {
        SaleLine::new(
            self.product_id.clone(),
            quantity,
            self.unit_price_for(quantity).cents(),
            self.cost_price_cents,
        )
    }
}

// =============================================================================
// Cached Worker
// =============================================================================

/// Snapshot of a store worker; the only input to offline PIN checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CachedWorker {
    pub worker_id: String,
    pub name: String,
    /// One-way PIN hash (Argon2 PHC string). Never a plaintext PIN.
    pub pin_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_synced: DateTime<Utc>,
}

/// The identity returned by a successful PIN check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WorkerIdentity {
    pub worker_id: String,
    pub name: String,
}

impl From<&CachedWorker> for WorkerIdentity {
    fn from(worker: &CachedWorker) -> Self {
        WorkerIdentity {
            worker_id: worker.worker_id.clone(),
            name: worker.name.clone(),
        }
    }
}

// =============================================================================
// Sync State
// =============================================================================

/// Aggregate sync health shown to the cashier.
///
/// Counters are recomputed from the queues after every run, never
/// incremented in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SyncState {
    #[ts(as = "Option<String>")]
    pub last_sync_time: Option<DateTime<Utc>>,
    pub pending_sales_count: i64,
    pub pending_credits_count: i64,
    pub last_error: Option<String>,
}

impl SyncState {
    /// Total records still waiting for acknowledgment.
    pub fn pending_total(&self) -> i64 {
        self.pending_sales_count + self.pending_credits_count
    }

    pub fn has_pending(&self) -> bool {
        self.pending_total() > 0
    }
}

// =============================================================================
// Worker Session
// =============================================================================

/// Where a worker session credential was minted.
///
/// Recorded for auditing only; no gate treats the two differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SessionOrigin {
    /// PIN verified by the server.
    Online,
    /// PIN verified against the local worker cache.
    Offline,
}

impl fmt::Display for SessionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOrigin::Online => write!(f, "online"),
            SessionOrigin::Offline => write!(f, "offline"),
        }
    }
}

/// A worker session credential with an absolute expiry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct WorkerSession {
    pub session_id: String,
    /// Signed bearer credential handed to the UI.
    pub token: String,
    pub store_id: String,
    pub worker_id: String,
    pub worker_name: String,
    pub origin: SessionOrigin,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

impl WorkerSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn identity(&self) -> WorkerIdentity {
        WorkerIdentity {
            worker_id: self.worker_id.clone(),
            name: self.worker_name.clone(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn queued_sale(next_attempt_at: Option<DateTime<Utc>>) -> QueuedSale {
        QueuedSale {
            local_id: 1,
            items: vec![SaleLine::new("p1", 2, 500, 300)],
            worker_id: "w1".into(),
            total_price_cents: 1000,
            total_cost_cents: 600,
            amount_paid_cents: 400,
            is_partial: true,
            created_at: Utc::now(),
            server_id: None,
            synced: false,
            sync_attempts: 0,
            next_attempt_at,
        }
    }

    #[test]
    fn test_new_sale_totals() {
        let sale = NewSale::new(
            "w1",
            vec![
                SaleLine::new("p1", 2, 250, 100),
                SaleLine::new("p2", 1, 500, 350),
            ],
            1000,
        );

        assert_eq!(sale.total_price().cents(), 1000);
        assert_eq!(sale.total_cost().cents(), 550);
        assert!(!sale.is_partial());
    }

    #[test]
    fn test_partial_sale() {
        let sale = NewSale::new("w1", vec![SaleLine::new("p1", 4, 250, 100)], 600);
        assert!(sale.is_partial());
    }

    #[test]
    fn test_balance_due() {
        let sale = queued_sale(None);
        assert_eq!(sale.balance_due().cents(), 600);
    }

    #[test]
    fn test_retry_eligibility() {
        let now = Utc::now();
        assert!(queued_sale(None).is_due(now));
        assert!(queued_sale(Some(now - Duration::seconds(1))).is_due(now));
        assert!(!queued_sale(Some(now + Duration::seconds(30))).is_due(now));

        let mut synced = queued_sale(None);
        synced.synced = true;
        synced.server_id = Some("srv-1".into());
        assert!(!synced.is_due(now));
    }

    #[test]
    fn test_bulk_pricing_requires_both_fields() {
        let product = CachedProduct {
            product_id: "p1".into(),
            name: "Rice 1kg".into(),
            brand: None,
            category: Some("Grains".into()),
            cost_price_cents: 80,
            selling_price_cents: 120,
            quantity: 30,
            unit_name: "bag".into(),
            bulk_quantity: Some(10),
            bulk_price_cents: None,
            last_updated: Utc::now(),
        };
        assert_eq!(product.unit_price_for(20).cents(), 120);
        assert_eq!(product.line(2).line_total().cents(), 240);
    }

    #[test]
    fn test_sync_state_totals() {
        let state = SyncState {
            pending_sales_count: 2,
            pending_credits_count: 1,
            ..Default::default()
        };
        assert_eq!(state.pending_total(), 3);
        assert!(state.has_pending());
        assert!(!SyncState::default().has_pending());
    }

    #[test]
    fn test_session_origin_serializes_lowercase() {
        let json = serde_json::to_string(&SessionOrigin::Offline).unwrap();
        assert_eq!(json, "\"offline\"");
    }
}
