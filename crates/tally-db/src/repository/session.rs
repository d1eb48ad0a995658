//! # Worker Session Repository
//!
//! Short-lived session records minted by the PIN authenticator. Every row
//! carries an absolute `expires_at`; expired rows are ignored by lookups and
//! removed by [`SessionRepository::purge_expired`].

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::WorkerSession;

const SESSION_COLUMNS: &str = r#"
    session_id, token, store_id, worker_id, worker_name,
    origin, issued_at, expires_at
"#;

/// Repository for worker sessions.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    pub async fn insert(&self, session: &WorkerSession) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO worker_sessions (
                session_id, token, store_id, worker_id, worker_name,
                origin, issued_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.token)
        .bind(&session.store_id)
        .bind(&session.worker_id)
        .bind(&session.worker_name)
        .bind(session.origin)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        debug!(
            session_id = %session.session_id,
            worker_id = %session.worker_id,
            origin = %session.origin,
            "Worker session stored"
        );
        Ok(())
    }

    /// Finds a session by its token, expired or not.
    pub async fn find_by_token(&self, token: &str) -> DbResult<Option<WorkerSession>> {
        let session = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM worker_sessions WHERE token = ?1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Sessions of one worker that are still valid at `now`.
    pub async fn active_for_worker(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<WorkerSession>> {
        let sessions: Vec<WorkerSession> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM worker_sessions WHERE worker_id = ?1 ORDER BY issued_at ASC"
        ))
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions
            .into_iter()
            .filter(|s| !s.is_expired_at(now))
            .collect())
    }

    /// Deletes a session; returns `true` if it existed.
    pub async fn delete_by_token(&self, token: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM worker_sessions WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every session that expired at or before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let sessions: Vec<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT session_id, expires_at FROM worker_sessions")
                .fetch_all(&self.pool)
                .await?;

        let mut purged = 0;
        for (session_id, expires_at) in sessions {
            if expires_at <= now {
                purged += sqlx::query("DELETE FROM worker_sessions WHERE session_id = ?1")
                    .bind(&session_id)
                    .execute(&self.pool)
                    .await?
                    .rows_affected();
            }
        }

        if purged > 0 {
            debug!(purged, "Expired worker sessions removed");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use chrono::{Duration, Utc};
    use tally_core::{SessionOrigin, WorkerSession};

    fn session(id: &str, worker: &str, ttl: Duration) -> WorkerSession {
        let now = Utc::now();
        WorkerSession {
            session_id: id.into(),
            token: format!("token-{id}"),
            store_id: "store-1".into(),
            worker_id: worker.into(),
            worker_name: "Achieng".into(),
            origin: SessionOrigin::Offline,
            issued_at: now,
            expires_at: now + ttl,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sessions();

        repo.insert(&session("s1", "w1", Duration::hours(8)))
            .await
            .unwrap();

        let found = repo.find_by_token("token-s1").await.unwrap().unwrap();
        assert_eq!(found.worker_id, "w1");
        assert_eq!(found.origin, SessionOrigin::Offline);
        assert!(repo.find_by_token("token-nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_sessions() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sessions();

        repo.insert(&session("live", "w1", Duration::hours(1)))
            .await
            .unwrap();
        repo.insert(&session("dead", "w1", Duration::seconds(-5)))
            .await
            .unwrap();

        assert_eq!(repo.active_for_worker("w1", Utc::now()).await.unwrap().len(), 1);
        assert_eq!(repo.purge_expired(Utc::now()).await.unwrap(), 1);
        assert!(repo.find_by_token("token-live").await.unwrap().is_some());
        assert!(repo.find_by_token("token-dead").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_token() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sessions();

        repo.insert(&session("s1", "w1", Duration::hours(1)))
            .await
            .unwrap();

        assert!(repo.delete_by_token("token-s1").await.unwrap());
        assert!(!repo.delete_by_token("token-s1").await.unwrap());
    }
}
