//! Password hashing behind a trait seam.
//!
//! The production implementation is argon2id; the comparison is slow on
//! purpose. Tests may swap in a cheap hasher through the trait.

use anyhow::{Result, anyhow};
use argon2::{
    Argon2, PasswordHash,
    password_hash::{PasswordHasher as _, PasswordVerifier as _, SaltString, rand_core::OsRng},
};

pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password for storage.
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// Verify a plaintext against a stored hash. Unparseable hashes count
    /// as a mismatch, never an error a caller could distinguish.
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Argon2PasswordHasher;

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash password: {err}"))
    }

    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(plaintext.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}
