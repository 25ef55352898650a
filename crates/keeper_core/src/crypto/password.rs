//! Password hashing.
//!
//! Passwords are hashed on the client and only the hex SHA-256 digest is
//! sent to the vault or cached locally.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Returns the lowercase hex SHA-256 digest of `password`.
#[must_use]
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Compares two password hashes in constant time.
///
/// Hashes of different length never match.
#[must_use]
pub fn verify_password_hash(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
