//! # Offline Worker Authenticator
//!
//! Verifies a worker PIN and mints a session credential, with or without the
//! store server.
//!
//! ```text
//! verify_pin(pin, store, token, prefer_online)
//!     │
//!     ├── prefer_online && monitor online
//!     │       └── server verify-pin ── ok ──► mint(Online) ──► Verified
//!     │                             └ err ──► (warn, fall through)
//!     │
//!     ├── worker cache empty ─────────────────────────► SetupRequired
//!     │
//!     └── argon2 verify against each cached hash
//!             ├── match ──► mint(Offline) ──► Verified
//!             └── none  ──────────────────► NotVerified
//! ```
//!
//! PIN format is owned by the server, so any string is checked as-is; an
//! empty PIN is never sent and never matches. Both session origins are
//! equivalent for every later check. Attempts are not rate-limited here.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::TerminalContext;
use crate::error::{AuthError, AuthResult};
use crate::remote::PinVerifyRequest;
use tally_core::{CachedWorker, SessionOrigin, WorkerIdentity, WorkerSession};

/// JWT claims of a worker session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (worker_id)
    pub sub: String,

    pub store_id: String,

    /// Where the PIN was checked.
    pub origin: SessionOrigin,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// Same value as the stored session_id.
    pub jti: String,
}

/// Input of one PIN check.
#[derive(Debug, Clone)]
pub struct PinRequest {
    pub pin: String,
    pub store_id: String,
    /// Store credential used for the server-side check.
    pub store_session_token: String,
    pub prefer_online: bool,
}

impl PinRequest {
    /// Builds a request from the terminal's configured store.
    pub fn for_store(ctx: &TerminalContext, pin: impl Into<String>) -> Self {
        PinRequest {
            pin: pin.into(),
            store_id: ctx.config.store_id().to_string(),
            store_session_token: ctx.config.store.session_token.clone(),
            prefer_online: ctx.config.auth.prefer_online,
        }
    }

    pub fn offline_only(mut self) -> Self {
        self.prefer_online = false;
        self
    }
}

/// Result of a PIN check. A wrong PIN is an outcome, not an error.
#[derive(Debug, Clone)]
pub enum PinOutcome {
    Verified(WorkerSession),
    /// No cached worker matched.
    NotVerified,
    /// The worker cache is empty; the terminal must sync workers while
    /// online before offline login can work.
    SetupRequired,
}

impl PinOutcome {
    pub fn session(&self) -> Option<&WorkerSession> {
        match self {
            PinOutcome::Verified(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, PinOutcome::Verified(_))
    }
}

#[derive(Debug, Clone)]
pub struct OfflineAuthenticator {
    ctx: TerminalContext,
}

impl OfflineAuthenticator {
    pub fn new(ctx: TerminalContext) -> Self {
        OfflineAuthenticator { ctx }
    }

    pub async fn verify_pin(&self, request: PinRequest) -> AuthResult<PinOutcome> {
        if request.prefer_online && !request.pin.is_empty() && self.ctx.monitor.current_status() {
            match self.verify_online(&request).await {
                Some(identity) => {
                    let session = self
                        .mint_session(&identity, &request.store_id, SessionOrigin::Online)
                        .await?;
                    return Ok(PinOutcome::Verified(session));
                }
                None => debug!("Falling back to the worker cache"),
            }
        }

        let workers = self.ctx.db.workers().list().await?;
        if workers.is_empty() {
            info!("PIN check with an empty worker cache");
            return Ok(PinOutcome::SetupRequired);
        }

        if request.pin.is_empty() {
            return Ok(PinOutcome::NotVerified);
        }

        match self.match_cached(workers, request.pin).await? {
            Some(worker) => {
                let identity = WorkerIdentity::from(&worker);
                let session = self
                    .mint_session(&identity, &request.store_id, SessionOrigin::Offline)
                    .await?;
                Ok(PinOutcome::Verified(session))
            }
            None => {
                info!("PIN did not match any cached worker");
                Ok(PinOutcome::NotVerified)
            }
        }
    }

    /// Server-side check. Every failure (including a rejected PIN) returns
    /// `None` so the caller tries the cache.
    async fn verify_online(&self, request: &PinRequest) -> Option<WorkerIdentity> {
        let body = PinVerifyRequest {
            pin: request.pin.clone(),
            store_id: request.store_id.clone(),
        };

        match self
            .ctx
            .remote
            .verify_pin(&body, &request.store_session_token)
            .await
        {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, "Online PIN verification failed");
                None
            }
        }
    }

    /// First cached worker whose hash accepts `pin`.
    async fn match_cached(
        &self,
        workers: Vec<CachedWorker>,
        pin: String,
    ) -> AuthResult<Option<CachedWorker>> {
        let hasher = self.ctx.hasher.clone();

        tokio::task::spawn_blocking(move || {
            workers
                .into_iter()
                .find(|w| hasher.verify(&pin, &w.pin_hash))
        })
        .await
        .map_err(|e| AuthError::Hashing(format!("PIN check task failed: {e}")))
    }

    async fn mint_session(
        &self,
        identity: &WorkerIdentity,
        store_id: &str,
        origin: SessionOrigin,
    ) -> AuthResult<WorkerSession> {
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::minutes(self.ctx.config.auth.session_ttl_minutes);
        let session_id = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: identity.worker_id.clone(),
            store_id: store_id.to_string(),
            origin,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: session_id.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key())?;

        let session = WorkerSession {
            session_id,
            token,
            store_id: store_id.to_string(),
            worker_id: identity.worker_id.clone(),
            worker_name: identity.name.clone(),
            origin,
            issued_at,
            expires_at,
        };
        self.ctx.db.sessions().insert(&session).await?;

        info!(
            worker_id = %session.worker_id,
            origin = %origin,
            expires_at = %session.expires_at,
            "Worker session issued"
        );
        Ok(session)
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.ctx.config.auth.session_secret.as_bytes())
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.ctx.config.auth.session_secret.as_bytes())
    }

    /// Checks a session token: signature, stored record, absolute expiry.
    pub async fn validate_session(&self, token: &str) -> AuthResult<WorkerSession> {
        let claims = decode::<Claims>(token, &self.decoding_key(), &Validation::default())?.claims;

        let session = self
            .ctx
            .db
            .sessions()
            .find_by_token(token)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.session_id != claims.jti {
            return Err(AuthError::Token("token does not match its session".into()));
        }
        if session.is_expired_at(Utc::now()) {
            return Err(AuthError::SessionExpired);
        }

        Ok(session)
    }

    /// Logs a worker out. Returns `true` if the session existed.
    pub async fn end_session(&self, token: &str) -> AuthResult<bool> {
        let removed = self.ctx.db.sessions().delete_by_token(token).await?;
        if removed {
            debug!("Worker session ended");
        }
        Ok(removed)
    }

    pub async fn purge_expired_sessions(&self) -> AuthResult<u64> {
        Ok(self.ctx.db.sessions().purge_expired(Utc::now()).await?)
    }
}
