//! Accounts and secret records.

use crate::crypto::CipherCodec;
use crate::error::{KeeperError, KeeperResult};
use crate::types::{OwnerId, RecordKey, Timestamp};
use serde::{Deserialize, Serialize};

/// A registered account.
///
/// Created once by Auth and never mutated. The client keeps a copy of each
/// account it has authenticated so it can log in while the vault is down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Id assigned by the vault.
    pub owner_id: OwnerId,
    /// Unique login.
    pub login: String,
    /// Hex SHA-256 of the password.
    pub password_hash: String,
}

impl UserAccount {
    /// Rejects empty logins and password hashes.
    pub fn validate_credentials(login: &str, password_hash: &str) -> KeeperResult<()> {
        if login.is_empty() {
            return Err(KeeperError::invalid_argument("login must not be empty"));
        }
        if password_hash.is_empty() {
            return Err(KeeperError::invalid_argument(
                "password hash must not be empty",
            ));
        }
        Ok(())
    }
}

/// A secret in plaintext form.
///
/// This is what callers see. It is never persisted as is; see
/// [`SealedSecret`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    /// Owning account.
    pub owner_id: OwnerId,
    /// Caller-chosen id, unique per owner.
    pub secret_id: String,
    /// The secret itself.
    pub payload: String,
    /// Free-form description.
    pub metadata: String,
    /// Time of the last accepted write.
    pub last_changed: Timestamp,
    /// Tombstone flag.
    pub deleted: bool,
}

impl SecretRecord {
    /// Creates a live record.
    pub fn new(
        owner_id: OwnerId,
        secret_id: impl Into<String>,
        payload: impl Into<String>,
        metadata: impl Into<String>,
        last_changed: Timestamp,
    ) -> Self {
        Self {
            owner_id,
            secret_id: secret_id.into(),
            payload: payload.into(),
            metadata: metadata.into(),
            last_changed,
            deleted: false,
        }
    }

    /// Returns the record's identity.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.owner_id, self.secret_id.clone())
    }

    /// Rejects an empty secret id.
    pub fn validate_id(secret_id: &str) -> KeeperResult<()> {
        if secret_id.is_empty() {
            return Err(KeeperError::invalid_argument("secret id must not be empty"));
        }
        Ok(())
    }

    /// Encrypts payload and metadata under `codec`.
    pub fn seal(&self, codec: &CipherCodec) -> KeeperResult<SealedSecret> {
        Ok(SealedSecret {
            owner_id: self.owner_id,
            secret_id: self.secret_id.clone(),
            payload: codec.encrypt(&self.payload)?,
            metadata: codec.encrypt(&self.metadata)?,
            last_changed: self.last_changed,
            deleted: self.deleted,
        })
    }
}

/// A secret in its at-rest form: payload and metadata are ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    /// Owning account.
    pub owner_id: OwnerId,
    /// Secret id, unique per owner.
    pub secret_id: String,
    /// Encrypted payload.
    pub payload: String,
    /// Encrypted metadata.
    pub metadata: String,
    /// Time of the last accepted write.
    pub last_changed: Timestamp,
    /// Tombstone flag.
    pub deleted: bool,
}

impl SealedSecret {
    /// Returns the record's identity.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.owner_id, self.secret_id.clone())
    }

    /// Decrypts payload and metadata under `codec`.
    pub fn open(&self, codec: &CipherCodec) -> KeeperResult<SecretRecord> {
        Ok(SecretRecord {
            owner_id: self.owner_id,
            secret_id: self.secret_id.clone(),
            payload: codec.decrypt(&self.payload)?,
            metadata: codec.decrypt(&self.metadata)?,
            last_changed: self.last_changed,
            deleted: self.deleted,
        })
    }

    /// Marks the record deleted in place, keeping the ciphertext.
    ///
    /// `last_changed` only moves forward when `at` is strictly newer.
    /// Returns whether the timestamp advanced.
    pub fn tombstone(&mut self, at: Option<Timestamp>) -> bool {
        self.deleted = true;
        match at {
            Some(at) if at > self.last_changed => {
                self.last_changed = at;
                true
            }
            _ => false,
        }
    }
}
