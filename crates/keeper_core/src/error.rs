//! Error types for Keeper.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type KeeperResult<T> = Result<T, KeeperError>;

/// The fixed error taxonomy shared by both tiers and the wire.
///
/// Storage-engine detail never crosses a tier boundary; only the kind and a
/// short message do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The login is already registered.
    DuplicateLogin,
    /// The account or record does not exist (or is tombstoned).
    NotFound,
    /// The password hash does not match.
    WrongPassword,
    /// The call carried no session token or an unknown one.
    Unauthenticated,
    /// The request is malformed (empty login, empty secret id, ...).
    InvalidArgument,
    /// Any other server-side failure.
    Internal,
    /// Authentication tag mismatch while decrypting.
    DecryptionFailed,
    /// Malformed encoding (base64, CBOR, JSON, UTF-8).
    DecodeFailed,
    /// The local replica could not be read or written.
    LocalPersistenceFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::DuplicateLogin => "duplicate login",
            ErrorKind::NotFound => "not found",
            ErrorKind::WrongPassword => "wrong password",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Internal => "internal error",
            ErrorKind::DecryptionFailed => "decryption failed",
            ErrorKind::DecodeFailed => "decode failed",
            ErrorKind::LocalPersistenceFailure => "local persistence failure",
        };
        f.write_str(name)
    }
}

/// Errors raised by vault, replica and codec operations.
#[derive(Debug, Error)]
pub enum KeeperError {
    /// Login already exists.
    #[error("login already exists: {login}")]
    DuplicateLogin {
        /// The rejected login.
        login: String,
    },

    /// Account or record not found.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// Password hash mismatch.
    #[error("wrong password")]
    WrongPassword,

    /// Missing or unknown session.
    #[error("unauthenticated: {reason}")]
    Unauthenticated {
        /// Why the session was rejected.
        reason: String,
    },

    /// Malformed request.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Internal failure.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },

    /// Ciphertext failed authentication.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Malformed encoding.
    #[error("decode failed: {message}")]
    DecodeFailed {
        /// Description of the failure.
        message: String,
    },

    /// Local log could not be read or written.
    #[error("local persistence failure: {message}")]
    LocalPersistence {
        /// Description of the failure.
        message: String,
    },
}

impl KeeperError {
    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeeperError::DuplicateLogin { .. } => ErrorKind::DuplicateLogin,
            KeeperError::NotFound { .. } => ErrorKind::NotFound,
            KeeperError::WrongPassword => ErrorKind::WrongPassword,
            KeeperError::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            KeeperError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            KeeperError::Internal { .. } => ErrorKind::Internal,
            KeeperError::DecryptionFailed { .. } => ErrorKind::DecryptionFailed,
            KeeperError::DecodeFailed { .. } => ErrorKind::DecodeFailed,
            KeeperError::LocalPersistence { .. } => ErrorKind::LocalPersistenceFailure,
        }
    }

    /// Rebuilds an error from a kind and message received over the wire.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::DuplicateLogin => Self::DuplicateLogin { login: message },
            ErrorKind::NotFound => Self::NotFound { what: message },
            ErrorKind::WrongPassword => Self::WrongPassword,
            ErrorKind::Unauthenticated => Self::Unauthenticated { reason: message },
            ErrorKind::InvalidArgument => Self::InvalidArgument { message },
            ErrorKind::Internal => Self::Internal { message },
            ErrorKind::DecryptionFailed => Self::DecryptionFailed { message },
            ErrorKind::DecodeFailed => Self::DecodeFailed { message },
            ErrorKind::LocalPersistenceFailure => Self::LocalPersistence { message },
        }
    }

    /// Creates a duplicate login error.
    pub fn duplicate_login(login: impl Into<String>) -> Self {
        Self::DuplicateLogin {
            login: login.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates an unauthenticated error.
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decode failed error.
    pub fn decode_failed(message: impl Into<String>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    /// Creates a local persistence error.
    pub fn local_persistence(message: impl Into<String>) -> Self {
        Self::LocalPersistence {
            message: message.into(),
        }
    }
}

impl From<keeper_storage::StorageError> for KeeperError {
    fn from(err: keeper_storage::StorageError) -> Self {
        Self::local_persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_wire_form() {
        let errors = [
            KeeperError::duplicate_login("alice"),
            KeeperError::not_found("note1"),
            KeeperError::WrongPassword,
            KeeperError::unauthenticated("no token"),
            KeeperError::invalid_argument("empty id"),
            KeeperError::internal("boom"),
            KeeperError::decryption_failed("tag"),
            KeeperError::decode_failed("base64"),
            KeeperError::local_persistence("disk"),
        ];

        for err in errors {
            let rebuilt = KeeperError::from_kind(err.kind(), "detail");
            assert_eq!(rebuilt.kind(), err.kind());
        }
    }

    #[test]
    fn storage_errors_are_local_persistence() {
        let err: KeeperError = keeper_storage::StorageError::ReadOnly("locked".into()).into();
        assert_eq!(err.kind(), ErrorKind::LocalPersistenceFailure);
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            KeeperError::duplicate_login("alice").to_string(),
            "login already exists: alice"
        );
        assert_eq!(ErrorKind::WrongPassword.to_string(), "wrong password");
    }
}
