//! # Sales Queue Repository
//!
//! Sales completed at the till, waiting for (or holding) a server id.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  queued_sales                         queued_sale_items                 │
//! │  ┌──────────┬─────────┬───────────┐   ┌──────────────┬─────────┬──────┐ │
//! │  │ local_id │ synced  │ server_id │   │ sale_local_id│ line_no │ ...  │ │
//! │  ├──────────┼─────────┼───────────┤   ├──────────────┼─────────┼──────┤ │
//! │  │    1     │    1    │  srv-88   │◄──│      1       │    0    │      │ │
//! │  │    2     │    0    │   NULL    │◄──│      2       │    0    │      │ │
//! │  │          │         │           │◄──│      2       │    1    │      │ │
//! │  └──────────┴─────────┴───────────┘   └──────────────┴─────────┴──────┘ │
//! │                                                                         │
//! │  append writes the sale and all of its lines in ONE transaction.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{NewSale, QueuedSale, SaleLine};

/// Flat `queued_sales` row; lines are attached afterwards.
#[derive(Debug, FromRow)]
struct SaleRow {
    local_id: i64,
    worker_id: String,
    total_price_cents: i64,
    total_cost_cents: i64,
    amount_paid_cents: i64,
    is_partial: bool,
    created_at: DateTime<Utc>,
    server_id: Option<String>,
    synced: bool,
    sync_attempts: i64,
    next_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    sale_local_id: i64,
    product_id: String,
    quantity: i64,
    unit_price_cents: i64,
    cost_price_cents: i64,
}

impl SaleRow {
    fn into_sale(self, items: Vec<SaleLine>) -> QueuedSale {
        QueuedSale {
            local_id: self.local_id,
            items,
            worker_id: self.worker_id,
            total_price_cents: self.total_price_cents,
            total_cost_cents: self.total_cost_cents,
            amount_paid_cents: self.amount_paid_cents,
            is_partial: self.is_partial,
            created_at: self.created_at,
            server_id: self.server_id,
            synced: self.synced,
            sync_attempts: self.sync_attempts,
            next_attempt_at: self.next_attempt_at,
        }
    }
}

const SALE_COLUMNS: &str = r#"
    local_id, worker_id, total_price_cents, total_cost_cents,
    amount_paid_cents, is_partial, created_at, server_id, synced,
    sync_attempts, next_attempt_at
"#;

/// Repository for the sales queue.
#[derive(Debug, Clone)]
pub struct SaleQueueRepository {
    pool: SqlitePool,
}

impl SaleQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleQueueRepository { pool }
    }

    /// Queues a sale and returns its local id.
    ///
    /// Totals and `is_partial` are derived from the lines here, so the stored
    /// header always agrees with its items.
    pub async fn append(&self, sale: &NewSale) -> DbResult<i64> {
        let now = Utc::now();
        let total_price = sale.total_price().cents();
        let total_cost = sale.total_cost().cents();
        let is_partial = sale.is_partial();

        let mut tx = self.pool.begin().await?;

        let local_id = sqlx::query(
            r#"
            INSERT INTO queued_sales (
                worker_id, total_price_cents, total_cost_cents,
                amount_paid_cents, is_partial, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&sale.worker_id)
        .bind(total_price)
        .bind(total_cost)
        .bind(sale.amount_paid_cents)
        .bind(is_partial)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (line_no, line) in sale.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO queued_sale_items (
                    sale_local_id, line_no, product_id, quantity,
                    unit_price_cents, cost_price_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(local_id)
            .bind(line_no as i64)
            .bind(&line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(line.cost_price_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            local_id,
            lines = sale.items.len(),
            total = total_price,
            is_partial,
            "Sale queued"
        );

        Ok(local_id)
    }

    /// Unsynced sales in insertion order.
    pub async fn query_unsynced(&self) -> DbResult<Vec<QueuedSale>> {
        let rows: Vec<SaleRow> = sqlx::query_as(&format!(
            "SELECT {SALE_COLUMNS} FROM queued_sales WHERE synced = 0 ORDER BY local_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let items: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT i.sale_local_id, i.product_id, i.quantity,
                   i.unit_price_cents, i.cost_price_cents
            FROM queued_sale_items i
            JOIN queued_sales s ON s.local_id = i.sale_local_id
            WHERE s.synced = 0
            ORDER BY i.sale_local_id, i.line_no
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(attach_items(rows, items))
    }

    /// Every queued sale, synced or not, in insertion order.
    pub async fn list_all(&self) -> DbResult<Vec<QueuedSale>> {
        let rows: Vec<SaleRow> = sqlx::query_as(&format!(
            "SELECT {SALE_COLUMNS} FROM queued_sales ORDER BY local_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let items: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT sale_local_id, product_id, quantity,
                   unit_price_cents, cost_price_cents
            FROM queued_sale_items
            ORDER BY sale_local_id, line_no
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(attach_items(rows, items))
    }

    /// Gets one queued sale by local id.
    pub async fn get(&self, local_id: i64) -> DbResult<Option<QueuedSale>> {
        let row: Option<SaleRow> = sqlx::query_as(&format!(
            "SELECT {SALE_COLUMNS} FROM queued_sales WHERE local_id = ?1"
        ))
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT sale_local_id, product_id, quantity,
                   unit_price_cents, cost_price_cents
            FROM queued_sale_items
            WHERE sale_local_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(local_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attach_items(vec![row], items).pop())
    }

    /// Records the server's acknowledgment.
    ///
    /// Idempotent: once a sale is synced, later calls leave the stored
    /// server id untouched. Returns `true` if this call applied it.
    pub async fn mark_synced(&self, local_id: i64, server_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE queued_sales SET
                synced = 1,
                server_id = ?2,
                next_attempt_at = NULL
            WHERE local_id = ?1 AND synced = 0
            "#,
        )
        .bind(local_id)
        .bind(server_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(local_id, server_id = %server_id, "Sale marked synced");
            return Ok(true);
        }

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT local_id FROM queued_sales WHERE local_id = ?1")
                .bind(local_id)
                .fetch_optional(&self.pool)
                .await?;

        match exists {
            Some(_) => Ok(false),
            None => Err(DbError::not_found("Queued sale", local_id)),
        }
    }

    /// Records a failed submission and the earliest time to try again.
    ///
    /// Returns the new attempt count, or `None` if the sale is already
    /// synced or unknown.
    pub async fn record_failure(
        &self,
        local_id: i64,
        next_attempt_at: DateTime<Utc>,
    ) -> DbResult<Option<i64>> {
        let attempts: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE queued_sales SET
                sync_attempts = sync_attempts + 1,
                next_attempt_at = ?2
            WHERE local_id = ?1 AND synced = 0
            RETURNING sync_attempts
            "#,
        )
        .bind(local_id)
        .bind(next_attempt_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempts)
    }

    /// Counts sales still waiting for acknowledgment.
    pub async fn count_unsynced(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queued_sales WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

fn attach_items(rows: Vec<SaleRow>, items: Vec<ItemRow>) -> Vec<QueuedSale> {
    let mut by_sale: HashMap<i64, Vec<SaleLine>> = HashMap::new();
    for item in items {
        by_sale
            .entry(item.sale_local_id)
            .or_default()
            .push(SaleLine::new(
                item.product_id,
                item.quantity,
                item.unit_price_cents,
                item.cost_price_cents,
            ));
    }

    rows.into_iter()
        .map(|row| {
            let lines = by_sale.remove(&row.local_id).unwrap_or_default();
            row.into_sale(lines)
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use chrono::{Duration, Utc};
    use tally_core::{NewSale, SaleLine};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn sale(paid: i64) -> NewSale {
        NewSale::new(
            "w1",
            vec![
                SaleLine::new("p1", 2, 250, 100),
                SaleLine::new("p2", 1, 500, 300),
            ],
            paid,
        )
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let db = db().await;
        let repo = db.sales();

        let a = repo.append(&sale(1000)).await.unwrap();
        let b = repo.append(&sale(1000)).await.unwrap();
        assert!(b > a);

        let stored = repo.get(a).await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 2);
        assert_eq!(stored.items[0].product_id, "p1");
        assert_eq!(stored.total_price_cents, 1000);
        assert_eq!(stored.total_cost_cents, 500);
        assert!(!stored.synced);
        assert!(stored.server_id.is_none());
    }

    #[tokio::test]
    async fn test_partial_sale_is_flagged() {
        let db = db().await;
        let id = db.sales().append(&sale(400)).await.unwrap();

        let stored = db.sales().get(id).await.unwrap().unwrap();
        assert!(stored.is_partial);
        assert_eq!(stored.balance_due().cents(), 600);
    }

    #[tokio::test]
    async fn test_query_unsynced_in_insertion_order() {
        let db = db().await;
        let repo = db.sales();

        let first = repo.append(&sale(1000)).await.unwrap();
        let second = repo.append(&sale(1000)).await.unwrap();
        let third = repo.append(&sale(1000)).await.unwrap();
        repo.mark_synced(second, "srv-2").await.unwrap();

        let pending: Vec<i64> = repo
            .query_unsynced()
            .await
            .unwrap()
            .iter()
            .map(|s| s.local_id)
            .collect();
        assert_eq!(pending, vec![first, third]);
        assert_eq!(repo.count_unsynced().await.unwrap(), 2);
        assert_eq!(repo.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_mark_synced_is_idempotent() {
        let db = db().await;
        let repo = db.sales();
        let id = repo.append(&sale(1000)).await.unwrap();

        assert!(repo.mark_synced(id, "srv-1").await.unwrap());
        assert!(!repo.mark_synced(id, "srv-other").await.unwrap());

        let stored = repo.get(id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.server_id.as_deref(), Some("srv-1"));
    }

    #[tokio::test]
    async fn test_mark_synced_unknown_id() {
        let db = db().await;
        let err = db.sales().mark_synced(42, "srv").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_record_failure_tracks_attempts() {
        let db = db().await;
        let repo = db.sales();
        let id = repo.append(&sale(1000)).await.unwrap();
        let later = Utc::now() + Duration::seconds(30);

        assert_eq!(repo.record_failure(id, later).await.unwrap(), Some(1));
        assert_eq!(repo.record_failure(id, later).await.unwrap(), Some(2));

        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.sync_attempts, 2);
        assert!(!stored.is_due(Utc::now()));

        repo.mark_synced(id, "srv-1").await.unwrap();
        assert_eq!(repo.record_failure(id, later).await.unwrap(), None);
        let stored = repo.get(id).await.unwrap().unwrap();
        assert!(stored.next_attempt_at.is_none());
    }

    #[tokio::test]
    async fn test_synced_always_has_server_id() {
        let db = db().await;
        let repo = db.sales();
        for _ in 0..3 {
            repo.append(&sale(1000)).await.unwrap();
        }
        repo.mark_synced(1, "srv-a").await.unwrap();

        for s in repo.list_all().await.unwrap() {
            if s.synced {
                assert!(s.server_id.is_some());
            }
        }
    }
}
