//! Password hashing.

use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordVerifier, SaltString};

use crate::error::AuthenticationError;

/// One-way password hashing consumed by the login flow.
pub trait PasswordHasher: Send + Sync {
    /// Hashes `plaintext` with a fresh salt.
    fn hash(&self, plaintext: &str) -> Result<String, AuthenticationError>;

    /// Returns true if `plaintext` matches `hash`. An unparseable hash never
    /// matches.
    fn verify(&self, hash: &str, plaintext: &str) -> bool;
}

/// argon2id with the library's default parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, AuthenticationError> {
        use password_hash::PasswordHasher as _;

        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthenticationError::Internal {
                reason: format!("password hashing failed: {e}"),
            })
    }

    fn verify(&self, hash: &str, plaintext: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
