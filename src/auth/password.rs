//! Credential hashing.
//!
//! Password hashing uses Argon2id. The configured cost maps to the Argon2
//! time cost; memory and parallelism stay at the algorithm defaults. Hashes
//! are stored in PHC string format, so the verify side needs no
//! configuration and old hashes survive cost changes.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::{EngineError, EngineResult};

/// Hash a plaintext secret with a fresh random salt
pub fn hash(plain: &str, cost: u32) -> EngineResult<String> {
    let params = Params::new(
        Params::DEFAULT_M_COST,
        cost.max(1),
        Params::DEFAULT_P_COST,
        None,
    )
    .map_err(|e| EngineError::PasswordHash(e.to_string()))?;

    let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| EngineError::PasswordHash(e.to_string()))
}

/// Check a plaintext secret against a stored PHC-format hash.
///
/// A mismatch is `Ok(false)`; only a malformed hash is an error.
pub fn verify(plain: &str, stored: &str) -> EngineResult<bool> {
    let parsed =
        PasswordHash::new(stored).map_err(|e| EngineError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash("hunter2!", 1).unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify("hunter2!", &stored).unwrap());
        assert!(!verify("wrong", &stored).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash("same-password", 1).unwrap();
        let b = hash("same-password", 1).unwrap();
        assert_ne!(a, b);
        assert!(verify("same-password", &a).unwrap());
        assert!(verify("same-password", &b).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        assert!(verify("anything", "not-a-phc-string").is_err());
    }
}
