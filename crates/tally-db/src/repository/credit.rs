//! # Credits Queue Repository
//!
//! Customer credits opened at the till. Same lifecycle as the sales queue:
//! appended unsynced, flipped to synced together with the server id.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{NewCredit, QueuedCredit};

const CREDIT_COLUMNS: &str = r#"
    local_id, customer_name, phone_number, total_owed_cents,
    amount_paid_cents, created_at, server_id, synced,
    sync_attempts, next_attempt_at
"#;

/// Repository for the credits queue.
#[derive(Debug, Clone)]
pub struct CreditQueueRepository {
    pool: SqlitePool,
}

impl CreditQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CreditQueueRepository { pool }
    }

    /// Queues a credit and returns its local id.
    pub async fn append(&self, credit: &NewCredit) -> DbResult<i64> {
        let local_id = sqlx::query(
            r#"
            INSERT INTO queued_credits (
                customer_name, phone_number, total_owed_cents,
                amount_paid_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(credit.customer_name.trim())
        .bind(&credit.phone_number)
        .bind(credit.total_owed_cents)
        .bind(credit.amount_paid_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!(local_id, owed = credit.total_owed_cents, "Credit queued");

        Ok(local_id)
    }

    /// Unsynced credits in insertion order.
    pub async fn query_unsynced(&self) -> DbResult<Vec<QueuedCredit>> {
        let credits = sqlx::query_as(&format!(
            "SELECT {CREDIT_COLUMNS} FROM queued_credits WHERE synced = 0 ORDER BY local_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(credits)
    }

    /// Every queued credit in insertion order.
    pub async fn list_all(&self) -> DbResult<Vec<QueuedCredit>> {
        let credits = sqlx::query_as(&format!(
            "SELECT {CREDIT_COLUMNS} FROM queued_credits ORDER BY local_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(credits)
    }

    pub async fn get(&self, local_id: i64) -> DbResult<Option<QueuedCredit>> {
        let credit = sqlx::query_as(&format!(
            "SELECT {CREDIT_COLUMNS} FROM queued_credits WHERE local_id = ?1"
        ))
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credit)
    }

    /// Records the server's acknowledgment. Idempotent, see
    /// [`SaleQueueRepository::mark_synced`](super::sale::SaleQueueRepository::mark_synced).
    pub async fn mark_synced(&self, local_id: i64, server_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE queued_credits SET
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
            debug!(local_id, server_id = %server_id, "Credit marked synced");
            return Ok(true);
        }

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT local_id FROM queued_credits WHERE local_id = ?1")
                .bind(local_id)
                .fetch_optional(&self.pool)
                .await?;

        match exists {
            Some(_) => Ok(false),
            None => Err(DbError::not_found("Queued credit", local_id)),
        }
    }

    /// Records a failed submission; returns the new attempt count.
    pub async fn record_failure(
        &self,
        local_id: i64,
        next_attempt_at: DateTime<Utc>,
    ) -> DbResult<Option<i64>> {
        let attempts: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE queued_credits SET
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

    pub async fn count_unsynced(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM queued_credits WHERE synced = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use tally_core::NewCredit;

    #[tokio::test]
    async fn test_credit_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.credits();

        let id = repo
            .append(
                &NewCredit::new("  Joseph Otieno ", 4500)
                    .with_phone("0722000111")
                    .with_amount_paid(500),
            )
            .await
            .unwrap();

        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.customer_name, "Joseph Otieno");
        assert_eq!(stored.phone_number.as_deref(), Some("0722000111"));
        assert_eq!(stored.balance_due().cents(), 4000);
        assert_eq!(repo.count_unsynced().await.unwrap(), 1);

        assert!(repo.mark_synced(id, "cr-19").await.unwrap());
        assert!(!repo.mark_synced(id, "cr-20").await.unwrap());

        let stored = repo.get(id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.server_id.as_deref(), Some("cr-19"));
        assert!(repo.query_unsynced().await.unwrap().is_empty());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_credit_without_phone() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let id = db.credits().append(&NewCredit::new("Walk-in", 100)).await.unwrap();

        let stored = db.credits().get(id).await.unwrap().unwrap();
        assert!(stored.phone_number.is_none());
        assert_eq!(stored.amount_paid_cents, 0);
    }
}
