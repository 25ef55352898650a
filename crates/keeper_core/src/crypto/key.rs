//! Encryption keys.

use crate::error::{KeeperError, KeeperResult};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// The tier a key belongs to.
///
/// Each tier derives its key under a distinct HKDF info string, so the same
/// passphrase never yields the same key for the vault and the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTier {
    /// Server-side vault.
    Vault,
    /// Client-side replica.
    Replica,
}

impl KeyTier {
    fn info(self) -> &'static [u8] {
        match self {
            KeyTier::Vault => b"keeper-vault-key-v1",
            KeyTier::Replica => b"keeper-replica-key-v1",
        }
    }
}

/// Encryption key for AES-256-GCM.
///
/// The key is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `bytes` is not exactly 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> KeeperResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(KeeperError::invalid_argument(format!(
                "key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a tier key from a passphrase using HKDF-SHA256.
    ///
    /// HKDF is not a password hash; the passphrase should already carry
    /// enough entropy.
    pub fn derive(passphrase: &[u8], salt: &[u8], tier: KeyTier) -> KeeperResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);

        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(tier.info(), &mut bytes)
            .map_err(|_| KeeperError::internal("HKDF expand failed"))?;

        Ok(Self { bytes })
    }

    /// Returns the raw key bytes. Never log the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
