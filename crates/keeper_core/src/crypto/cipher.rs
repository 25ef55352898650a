//! AES-256-GCM codec producing base64 text.

use super::key::EncryptionKey;
use crate::error::{KeeperError, KeeperResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;

/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encrypts and decrypts secret strings for one tier.
///
/// The output format is `base64(nonce || ciphertext || tag)` using the
/// standard padded alphabet. Encrypting the same plaintext twice yields
/// different strings.
pub struct CipherCodec {
    cipher: Aes256Gcm,
}

impl CipherCodec {
    /// Creates a codec bound to `key`.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { cipher }
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> KeeperResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| KeeperError::internal("encryption error"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    /// Decrypts a string produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// - `DecodeFailed` for malformed base64, input shorter than nonce plus
    ///   tag, or plaintext that is not UTF-8
    /// - `DecryptionFailed` when the tag does not verify (wrong key or
    ///   tampered ciphertext)
    pub fn decrypt(&self, encoded: &str) -> KeeperResult<String> {
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|e| KeeperError::decode_failed(format!("invalid base64: {e}")))?;

        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(KeeperError::decode_failed("ciphertext too short"));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| KeeperError::decryption_failed("authentication tag mismatch"))?;

        String::from_utf8(plaintext)
            .map_err(|_| KeeperError::decode_failed("plaintext is not valid UTF-8"))
    }
}

impl std::fmt::Debug for CipherCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherCodec")
            .field("cipher", &"AES-256-GCM")
            .finish()
    }
}
