//! # PIN Hashing
//!
//! The worker cache only ever holds Argon2id PHC strings.
//!
//! ```text
//! server value            cached value
//! ────────────            ────────────
//! "$argon2id$v=19$..."  → stored unchanged
//! "1234"                → hash("1234")  (plaintext never reaches disk)
//!
//! offline check: argon2.verify(entered_pin, cached_value)
//! ```

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

use crate::config::AuthSettings;
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone)]
pub struct PinHasher {
    params: Params,
}

impl PinHasher {
    /// Argon2id with the given memory cost (KiB) and iteration count.
    pub fn new(memory_kib: u32, iterations: u32) -> AuthResult<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(PinHasher { params })
    }

    pub fn from_settings(settings: &AuthSettings) -> AuthResult<Self> {
        Self::new(settings.hash_memory_kib, settings.hash_iterations)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, pin: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self.argon2().hash_password(pin.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    /// Checks `pin` against a PHC string. Malformed hashes never match.
    ///
    /// Cost parameters are read from the hash itself, so hashes made with
    /// older settings keep verifying.
    pub fn verify(&self, pin: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(pin.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// True if `value` is already an Argon2 PHC string.
    pub fn is_hashed(value: &str) -> bool {
        value.starts_with("$argon2")
    }

    /// The value to cache for a PIN as delivered by the server.
    pub fn to_cached(&self, server_value: &str) -> AuthResult<String> {
        if Self::is_hashed(server_value) {
            Ok(server_value.to_string())
        } else {
            self.hash(server_value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PinHasher {
        PinHasher::new(64, 1).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let h = hasher();
        let hash = h.hash("1234").unwrap();

        assert!(PinHasher::is_hashed(&hash));
        assert!(!hash.contains("1234"));
        assert!(h.verify("1234", &hash));
        assert!(!h.verify("9999", &hash));
    }

    #[test]
    fn test_same_pin_different_salts() {
        let h = hasher();
        assert_ne!(h.hash("1234").unwrap(), h.hash("1234").unwrap());
    }

    #[test]
    fn test_to_cached_keeps_existing_hash() {
        let h = hasher();
        let existing = h.hash("4321").unwrap();

        assert_eq!(h.to_cached(&existing).unwrap(), existing);

        let from_plain = h.to_cached("4321").unwrap();
        assert_ne!(from_plain, "4321");
        assert!(h.verify("4321", &from_plain));
    }

    #[test]
    fn test_verify_with_other_cost_params() {
        let stronger = PinHasher::new(128, 2).unwrap();
        let hash = stronger.hash("2468").unwrap();
        assert!(hasher().verify("2468", &hash));
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        assert!(!hasher().verify("1234", "1234"));
        assert!(!hasher().verify("1234", ""));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(matches!(PinHasher::new(1, 1), Err(AuthError::Hashing(_))));
    }
}
