//! # Sync State Repository
//!
//! The single `sync_state` row (id = 1), created by the first migration.
//! It is overwritten as a whole after every sync run; counters are always
//! the result of a fresh count, never an increment.

use sqlx::SqlitePool;

use crate::error::DbResult;
use tally_core::SyncState;

/// Repository for the sync state singleton.
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

impl SyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncStateRepository { pool }
    }

    /// Loads the current state (defaults if the row was never written).
    pub async fn load(&self) -> DbResult<SyncState> {
        let state: Option<SyncState> = sqlx::query_as(
            r#"
            SELECT last_sync_time, pending_sales_count,
                   pending_credits_count, last_error
            FROM sync_state
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(state.unwrap_or_default())
    }

    /// Overwrites the singleton.
    pub async fn save(&self, state: &SyncState) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (
                id, last_sync_time, pending_sales_count,
                pending_credits_count, last_error
            ) VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                last_sync_time = excluded.last_sync_time,
                pending_sales_count = excluded.pending_sales_count,
                pending_credits_count = excluded.pending_credits_count,
                last_error = excluded.last_error
            "#,
        )
        .bind(state.last_sync_time)
        .bind(state.pending_sales_count)
        .bind(state.pending_credits_count)
        .bind(&state.last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
