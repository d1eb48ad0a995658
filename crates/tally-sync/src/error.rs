//! # Engine Error Types
//!
//! `SyncError` is what the manager returns, `RemoteError` covers one server
//! round trip, and `AuthError` covers the PIN authenticator. Per-record
//! `RemoteError`s inside a sync run never escape the run; they become a retry
//! schedule and `SyncState.last_error`.

use tally_core::CoreError;
use tally_db::DbError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for server calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type alias for authenticator operations.
pub type AuthResult<T> = Result<T, AuthError>;

// =============================================================================
// Sync Error
// =============================================================================

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid server URL.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Local store failure. Never swallowed.
    #[error("Local store error: {0}")]
    Database(#[from] DbError),

    /// Record rejected before it reached the queue.
    #[error("Rejected record: {0}")]
    Validation(#[from] CoreError),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Server call failed outside a sync run (cache refresh).
    #[error("Server error: {0}")]
    Remote(#[from] RemoteError),

    /// PIN hashing or session failure outside the authenticator.
    #[error("Credential error: {0}")]
    Auth(#[from] AuthError),

    /// Operation requires connectivity and the monitor reports offline.
    #[error("Terminal is offline")]
    Offline,

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl SyncError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
        )
    }
}

// =============================================================================
// Remote Error
// =============================================================================

/// Failures talking to the store server.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection refused, DNS failure, reset, ...
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    /// Store session token rejected (401/403).
    #[error("Server rejected the store session token")]
    Unauthorized,

    /// Any other non-success status.
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Returns true if the same request may succeed later unchanged.
    ///
    /// ## Retryable
    /// - Network failures and timeouts
    /// - 5xx and 429 responses
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout => true,
            RemoteError::Status { status, .. } => *status >= 500 || *status == 429,
            RemoteError::Unauthorized | RemoteError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

// =============================================================================
// Auth Error
// =============================================================================

/// Authenticator failures. A wrong PIN is NOT an error; see `PinOutcome`.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Argon2 failed to hash or parse a stored hash.
    #[error("PIN hashing failed: {0}")]
    Hashing(String),

    /// Session token could not be signed or verified.
    #[error("Session token error: {0}")]
    Token(String),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,

    #[error("Local store error: {0}")]
    Database(#[from] DbError),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::SessionExpired,
            _ => AuthError::Token(err.to_string()),
        }
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::Hashing(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_retryable() {
        assert!(RemoteError::Timeout.is_retryable());
        assert!(RemoteError::Network("reset".into()).is_retryable());
        assert!(RemoteError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!RemoteError::Status {
            status: 422,
            body: String::new()
        }
        .is_retryable());
        assert!(!RemoteError::Unauthorized.is_retryable());
    }

    #[test]
    fn test_db_error_converts() {
        let err: SyncError = DbError::PoolExhausted.into();
        assert!(matches!(err, SyncError::Database(_)));
        assert!(!err.is_config_error());
    }
}
