//! # Worker Cache Repository
//!
//! Snapshot of the store's workers. While the server is unreachable this is
//! the only thing a PIN can be checked against, so it only ever holds PIN
//! hashes; hashing happens before the snapshot reaches this layer.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::CachedWorker;

/// Repository for the worker snapshot.
#[derive(Debug, Clone)]
pub struct WorkerCacheRepository {
    pool: SqlitePool,
}

impl WorkerCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        WorkerCacheRepository { pool }
    }

    /// Swaps the whole snapshot for `workers` in one transaction.
    pub async fn replace_all(&self, workers: &[CachedWorker]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cached_workers")
            .execute(&mut *tx)
            .await?;

        for worker in workers {
            sqlx::query(
                r#"
                INSERT INTO cached_workers (
                    worker_id, name, pin_hash, created_at, last_synced
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&worker.worker_id)
            .bind(&worker.name)
            .bind(&worker.pin_hash)
            .bind(worker.created_at)
            .bind(worker.last_synced)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(count = workers.len(), "Worker cache replaced");
        Ok(())
    }

    pub async fn list(&self) -> DbResult<Vec<CachedWorker>> {
        let workers = sqlx::query_as(
            r#"
            SELECT worker_id, name, pin_hash, created_at, last_synced
            FROM cached_workers
            ORDER BY local_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(workers)
    }

    pub async fn get(&self, worker_id: &str) -> DbResult<Option<CachedWorker>> {
        let worker = sqlx::query_as(
            r#"
            SELECT worker_id, name, pin_hash, created_at, last_synced
            FROM cached_workers
            WHERE worker_id = ?1
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(worker)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cached_workers")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use chrono::Utc;
    use tally_core::CachedWorker;

    fn worker(id: &str, name: &str) -> CachedWorker {
        let now = Utc::now();
        CachedWorker {
            worker_id: id.into(),
            name: name.into(),
            pin_hash: format!("$argon2id$stub${id}"),
            created_at: now,
            last_synced: now,
        }
    }

    #[tokio::test]
    async fn test_replace_all_swaps_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.workers();

        repo.replace_all(&[worker("w1", "Achieng"), worker("w2", "Baraka")])
            .await
            .unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        repo.replace_all(&[worker("w3", "Chebet")]).await.unwrap();

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["Chebet".to_string()]);
        assert!(repo.get("w1").await.unwrap().is_none());
        assert_eq!(repo.get("w3").await.unwrap().unwrap().pin_hash, "$argon2id$stub$w3");
    }

    #[tokio::test]
    async fn test_replace_with_empty_list_clears_cache() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.workers();

        repo.replace_all(&[worker("w1", "Achieng")]).await.unwrap();
        repo.replace_all(&[]).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
