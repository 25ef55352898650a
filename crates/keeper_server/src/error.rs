//! Error types for the vault server.

use keeper_core::{ErrorKind, KeeperError};
use keeper_protocol::{ProtocolError, RemoteError};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the vault server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed or oversized request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A vault or session operation failed.
    #[error(transparent)]
    Vault(#[from] KeeperError),

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server cannot start with this configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the caller is at fault.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Protocol(_) => true,
            ServerError::Vault(err) => !matches!(
                err.kind(),
                ErrorKind::Internal
                    | ErrorKind::LocalPersistenceFailure
                    | ErrorKind::DecryptionFailed
            ),
            _ => false,
        }
    }

    /// Returns true if the server is at fault.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Reduces the error to what the caller may see.
    ///
    /// Storage and key failures on the server are reported as `Internal`;
    /// their detail stays in the server log.
    pub fn to_remote(&self) -> RemoteError {
        match self {
            ServerError::InvalidRequest(msg) => RemoteError::new(ErrorKind::InvalidArgument, msg),
            ServerError::Protocol(err) => RemoteError::new(ErrorKind::DecodeFailed, err.to_string()),
            ServerError::Vault(err) => match err.kind() {
                ErrorKind::LocalPersistenceFailure | ErrorKind::DecryptionFailed => {
                    RemoteError::new(ErrorKind::Internal, "vault storage failure")
                }
                _ => RemoteError::from(err),
            },
            ServerError::Config(_) | ServerError::Internal(_) | ServerError::Io(_) => {
                RemoteError::new(ErrorKind::Internal, "internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::from(KeeperError::WrongPassword).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(ServerError::from(KeeperError::local_persistence("disk")).is_server_error());
    }

    #[test]
    fn vault_kinds_pass_through() {
        let remote = ServerError::from(KeeperError::not_found("note1")).to_remote();
        assert_eq!(remote.kind, ErrorKind::NotFound);
        assert!(remote.message.contains("note1"));
    }

    #[test]
    fn storage_detail_stays_on_server() {
        let remote = ServerError::from(KeeperError::local_persistence("/var/vault.log: EIO"))
            .to_remote();
        assert_eq!(remote.kind, ErrorKind::Internal);
        assert!(!remote.message.contains("EIO"));
    }
}
