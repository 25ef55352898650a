//! Encryption at rest for secret payloads.
//!
//! Each tier holds its own [`CipherCodec`]: the vault seals records under a
//! vault key and the replica under a replica key, so ciphertext never moves
//! between tiers. Records cross the wire as plaintext and are resealed on
//! arrival.
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption
//! - A fresh random nonce per encryption, prepended to the ciphertext
//! - Keys are zeroized on drop and redacted from `Debug`
//! - Passphrase keys are derived with HKDF-SHA256 under a per-tier info string
//!
//! ## Usage
//!
//! ```rust
//! use keeper_core::crypto::{CipherCodec, EncryptionKey};
//!
//! let codec = CipherCodec::new(EncryptionKey::generate());
//! let sealed = codec.encrypt("hunter2").unwrap();
//! assert_eq!(codec.decrypt(&sealed).unwrap(), "hunter2");
//! ```

mod cipher;
mod key;
mod password;

pub use cipher::{CipherCodec, NONCE_SIZE, TAG_SIZE};
pub use key::{EncryptionKey, KeyTier, KEY_SIZE};
pub use password::{hash_password, verify_password_hash};
