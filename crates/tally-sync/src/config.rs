//! # Terminal Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_SERVER_URL=https://api.tally.example                         │
//! │     TALLY_STORE_TOKEN=...                                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/terminal.toml (Linux)                          │
//! │     ~/Library/Application Support/com.tally.pos/terminal.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     generated terminal id and session secret                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # terminal.toml
//! [terminal]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Till 2"
//!
//! [store]
//! id = "store-001"
//! session_token = "eyJhbGciOi..."
//!
//! [server]
//! base_url = "https://api.tally.example"
//!
//! [sync]
//! reconnect_delay_ms = 5000
//! initial_backoff_ms = 2000
//! max_backoff_secs = 300
//!
//! [auth]
//! session_ttl_minutes = 480
//! prefer_online = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

/// Longest worker session the terminal will mint (30 days).
pub const MAX_SESSION_TTL_MINUTES: i64 = 30 * 24 * 60;

// =============================================================================
// Terminal
// =============================================================================

/// Identity of this till.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSettings {
    /// Stable terminal id; part of every idempotency key.
    pub id: String,

    #[serde(default = "default_terminal_name")]
    pub name: String,
}

fn default_terminal_name() -> String {
    "POS Terminal".to_string()
}

impl Default for TerminalSettings {
    fn default() -> Self {
        TerminalSettings {
            id: Uuid::new_v4().to_string(),
            name: default_terminal_name(),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// The store this terminal sells for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Store-owner session token, sent as a bearer token on every call.
    /// Issued elsewhere; the terminal only carries it.
    #[serde(default)]
    pub session_token: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            id: "default-store".to_string(),
            name: "Default Store".to_string(),
            session_token: String::new(),
        }
    }
}

// =============================================================================
// Server
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL of the store server, without a trailing `/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_request_timeout() -> u64 {
    10
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Sync
// =============================================================================

/// Sync manager timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Delay between going online and the reconnect-triggered run.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Backoff after a record's first failed submission.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Failed submissions after which a record is parked.
    /// 0 = retry forever.
    #[serde(default)]
    pub max_attempts: u32,

    /// Interval of the connectivity probe.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

fn default_reconnect_delay() -> u64 {
    5_000
}
fn default_initial_backoff() -> u64 {
    2_000
}
fn default_max_backoff() -> u64 {
    300
}
fn default_probe_interval() -> u64 {
    15
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            reconnect_delay_ms: default_reconnect_delay(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_attempts: 0,
            probe_interval_secs: default_probe_interval(),
        }
    }
}

impl SyncSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

// =============================================================================
// Auth
// =============================================================================

/// Worker PIN authenticator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Absolute lifetime of a worker session.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_minutes: i64,

    /// HMAC secret for worker session tokens. Generated on first run.
    #[serde(default = "generate_secret")]
    pub session_secret: String,

    /// Try the server before the local worker cache.
    #[serde(default = "default_true")]
    pub prefer_online: bool,

    /// Argon2 memory cost (KiB) for cached PIN hashes.
    #[serde(default = "default_hash_memory")]
    pub hash_memory_kib: u32,

    /// Argon2 iterations for cached PIN hashes.
    #[serde(default = "default_hash_iterations")]
    pub hash_iterations: u32,
}

fn default_session_ttl() -> i64 {
    8 * 60
}
fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}
fn default_true() -> bool {
    true
}
fn default_hash_memory() -> u32 {
    19 * 1024
}
fn default_hash_iterations() -> u32 {
    2
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            session_ttl_minutes: default_session_ttl(),
            session_secret: generate_secret(),
            prefer_online: true,
            hash_memory_kib: default_hash_memory(),
            hash_iterations: default_hash_iterations(),
        }
    }
}

// =============================================================================
// Terminal Config
// =============================================================================

/// Complete terminal configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default)]
    pub terminal: TerminalSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub auth: AuthSettings,
}

impl TerminalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (terminal.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading terminal config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Like [`load`](Self::load), but writes the file back whenever it had
    /// to generate the terminal id or session secret.
    ///
    /// Env overrides are applied after the write and never persisted.
    pub fn load_or_init(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        let (mut config, generated): (Self, bool) = if path.exists() {
            info!(?path, "Loading terminal config from file");
            let contents = std::fs::read_to_string(&path)?;
            let table: toml::Table = toml::from_str(&contents)?;
            let generated = !has_key(&table, "terminal", "id")
                || !has_key(&table, "auth", "session_secret");
            (toml::Value::Table(table).try_into()?, generated)
        } else {
            debug!(?path, "Config file not found, generating one");
            (Self::default(), true)
        };

        if generated {
            config.save(Some(path))?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load terminal config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    ///
    /// Call after first run so the generated terminal id and session secret
    /// survive restarts.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Terminal config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.terminal.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("terminal.id must not be empty".into()));
        }

        if self.store.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("store.id must not be empty".into()));
        }

        let url = &self.server.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(SyncError::InvalidUrl(format!(
                "Server URL must start with http:// or https://, got: {}",
                url
            )));
        }

        if self.sync.reconnect_delay_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "reconnect_delay_ms must be greater than 0".into(),
            ));
        }

        if self.auth.session_secret.is_empty() {
            return Err(SyncError::InvalidConfig(
                "auth.session_secret must not be empty".into(),
            ));
        }

        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&self.auth.session_ttl_minutes) {
            return Err(SyncError::InvalidConfig(format!(
                "session_ttl_minutes must be between 1 and {}",
                MAX_SESSION_TTL_MINUTES
            )));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TALLY_TERMINAL_ID") {
            debug!(terminal_id = %id, "Overriding terminal ID from environment");
            self.terminal.id = id;
        }

        if let Ok(id) = std::env::var("TALLY_STORE_ID") {
            self.store.id = id;
        }

        if let Ok(token) = std::env::var("TALLY_STORE_TOKEN") {
            debug!("Overriding store session token from environment");
            self.store.session_token = token;
        }

        if let Ok(url) = std::env::var("TALLY_SERVER_URL") {
            debug!(url = %url, "Overriding server URL from environment");
            self.server.base_url = url;
        }

        if let Ok(delay) = std::env::var("TALLY_RECONNECT_DELAY_MS") {
            match delay.parse::<u64>() {
                Ok(ms) => self.sync.reconnect_delay_ms = ms,
                Err(_) => warn!(value = %delay, "Ignoring invalid TALLY_RECONNECT_DELAY_MS"),
            }
        }

        if let Ok(secret) = std::env::var("TALLY_SESSION_SECRET") {
            self.auth.session_secret = secret;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("terminal.toml"))
    }

    /// Default location of the terminal's SQLite file.
    pub fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.data_dir().join("terminal.db"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn terminal_id(&self) -> &str {
        &self.terminal.id
    }

    pub fn store_id(&self) -> &str {
        &self.store.id
    }

    pub fn base_url(&self) -> &str {
        self.server.base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

fn has_key(table: &toml::Table, section: &str, key: &str) -> bool {
    table
        .get(section)
        .and_then(toml::Value::as_table)
        .is_some_and(|t| t.contains_key(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TerminalConfig::default();
        assert!(!config.terminal.id.is_empty());
        assert_eq!(config.sync.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.auth.session_ttl_minutes, 480);
        assert!(config.auth.prefer_online);
        assert_eq!(config.auth.session_secret.len(), 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_values_differ() {
        let a = TerminalConfig::default();
        let b = TerminalConfig::default();
        assert_ne!(a.terminal.id, b.terminal.id);
        assert_ne!(a.auth.session_secret, b.auth.session_secret);
    }

    #[test]
    fn test_config_validation() {
        let mut config = TerminalConfig::default();

        config.terminal.id = String::new();
        assert!(config.validate().is_err());

        config.terminal.id = "till-1".to_string();
        config.server.base_url = "ftp://server".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.server.base_url = "https://api.tally.example".to_string();
        config.sync.reconnect_delay_ms = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        config.sync.reconnect_delay_ms = 100;
        config.auth.session_secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_ttl_bounds() {
        let mut config = TerminalConfig::default();

        config.auth.session_ttl_minutes = 0;
        assert!(config.validate().is_err());

        config.auth.session_ttl_minutes = i64::MAX;
        assert!(config.validate().unwrap_err().is_config_error());

        config.auth.session_ttl_minutes = MAX_SESSION_TTL_MINUTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TerminalConfig = toml::from_str(
            r#"
            [terminal]
            id = "till-7"

            [server]
            base_url = "https://api.tally.example/"
            "#,
        )
        .unwrap();

        assert_eq!(config.terminal_id(), "till-7");
        assert_eq!(config.base_url(), "https://api.tally.example");
        assert_eq!(config.sync.reconnect_delay_ms, 5_000);
        assert_eq!(config.sync.max_attempts, 0);
        assert!(!config.auth.session_secret.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("tally-config-{}", Uuid::new_v4()));
        let path = dir.join("terminal.toml");

        let mut config = TerminalConfig::default();
        config.store.id = "store-42".to_string();
        config.save(Some(path.clone())).unwrap();

        let loaded: TerminalConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.store.id, "store-42");
        assert_eq!(loaded.terminal.id, config.terminal.id);
        assert_eq!(loaded.auth.session_secret, config.auth.session_secret);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_first_run_identity_survives_restart() {
        let dir = std::env::temp_dir().join(format!("tally-config-{}", Uuid::new_v4()));
        let path = dir.join("terminal.toml");

        let first = TerminalConfig::load_or_init(Some(path.clone())).unwrap();
        assert!(path.exists());

        let second = TerminalConfig::load_or_init(Some(path.clone())).unwrap();
        assert_eq!(second.terminal.id, first.terminal.id);
        assert_eq!(second.auth.session_secret, first.auth.session_secret);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_partial_file_gets_identity_written_back() {
        let dir = std::env::temp_dir().join(format!("tally-config-{}", Uuid::new_v4()));
        let path = dir.join("terminal.toml");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            &path,
            "[server]\nbase_url = \"https://api.tally.example\"\n",
        )
        .unwrap();

        let first = TerminalConfig::load_or_init(Some(path.clone())).unwrap();
        let second = TerminalConfig::load_or_init(Some(path.clone())).unwrap();
        assert_eq!(first.base_url(), "https://api.tally.example");
        assert_eq!(second.terminal.id, first.terminal.id);
        assert_eq!(second.auth.session_secret, first.auth.session_secret);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
