//! Error types for the client.

use keeper_core::{ErrorKind, KeeperError};
use keeper_protocol::RemoteError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur on the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The vault could not be reached or did not answer in time.
    #[error("transport error: {0}")]
    Transport(String),

    /// The vault rejected the call.
    #[error("vault error: {0}")]
    Remote(RemoteError),

    /// A local operation failed.
    #[error(transparent)]
    Local(#[from] KeeperError),

    /// The vault answered with something that is not a valid response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The vault answered with the wrong reply variant.
    #[error("unexpected reply to {call}")]
    UnexpectedReply {
        /// The call that was made.
        call: &'static str,
    },
}

impl ClientError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Returns true if the vault could not be reached.
    ///
    /// Callers treat this as "proceed on local state".
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    /// Returns the error kind, if the failure has one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Remote(err) => Some(err.kind),
            ClientError::Local(err) => Some(err.kind()),
            ClientError::Protocol(_) | ClientError::UnexpectedReply { .. } => {
                Some(ErrorKind::DecodeFailed)
            }
            ClientError::Transport(_) => None,
        }
    }
}

impl From<RemoteError> for ClientError {
    fn from(err: RemoteError) -> Self {
        Self::Remote(err)
    }
}
