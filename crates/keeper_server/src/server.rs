//! The vault server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::vault::CredentialVault;
use keeper_core::{CipherCodec, EncryptionKey, ErrorKind};
use keeper_protocol::{RemoteError, RequestFrame, ResponseFrame};
use keeper_storage::FileBackend;
use std::sync::Arc;

/// The vault server.
///
/// Binds the session registry, the vault and the request handler, and
/// speaks CBOR frames. Transport is left to the caller: [`crate::net`]
/// serves it over TCP and tests call [`handle_frame`](Self::handle_frame)
/// directly.
///
/// # Example
///
/// ```
/// use keeper_server::{KeeperServer, ServerConfig};
///
/// let server = KeeperServer::new(ServerConfig::default()).unwrap();
/// assert_eq!(server.session_count(), 0);
/// ```
#[derive(Debug)]
pub struct KeeperServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl KeeperServer {
    /// Creates a server from its configuration.
    ///
    /// Opens and replays the journal when one is configured.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a journal is configured without a vault key, or
    /// the journal error if replay fails.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let vault = match &config.journal_path {
            Some(path) => {
                let key = config.vault_key.clone().ok_or_else(|| {
                    ServerError::Config("a journaled vault requires a vault key".into())
                })?;
                let backend = FileBackend::open_with_create_dirs(path)
                    .map_err(keeper_core::KeeperError::from)?;
                tracing::info!(path = %path.display(), "opening vault journal");
                CredentialVault::open_with_options(
                    CipherCodec::new(key),
                    Box::new(backend),
                    config.sync_journal,
                )?
            }
            None => {
                let key = config
                    .vault_key
                    .clone()
                    .unwrap_or_else(EncryptionKey::generate);
                CredentialVault::in_memory(CipherCodec::new(key))
            }
        };
        Ok(Self::with_vault(config, vault))
    }

    /// Creates a server around an existing vault.
    pub fn with_vault(config: ServerConfig, vault: CredentialVault) -> Self {
        let context = Arc::new(HandlerContext::new(config, vault));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Handles a decoded request.
    pub fn handle_request(&self, frame: RequestFrame) -> ResponseFrame {
        self.handler.handle(frame)
    }

    /// Decodes a request frame, handles it and encodes the response.
    ///
    /// Undecodable input yields a `DecodeFailed` response rather than an
    /// error, so the caller always has something to send back.
    pub fn handle_frame(&self, bytes: &[u8]) -> ServerResult<Vec<u8>> {
        let response = match RequestFrame::decode(bytes) {
            Ok(frame) => self.handle_request(frame),
            Err(err) => {
                tracing::debug!(error = %err, "undecodable request frame");
                ResponseFrame::err(RemoteError::new(ErrorKind::DecodeFailed, err.to_string()))
            }
        };
        Ok(response.encode()?)
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the vault.
    pub fn vault(&self) -> &CredentialVault {
        &self.context.vault
    }

    /// Returns the number of live sessions.
    pub fn session_count(&self) -> usize {
        self.context.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::{hash_password, OwnerId};
    use keeper_protocol::{Credentials, RemoteCall, Reply};

    fn auth_frame() -> Vec<u8> {
        RequestFrame::anonymous(RemoteCall::Auth(Credentials {
            login: "alice".into(),
            password_hash: hash_password("pw1"),
        }))
        .encode()
        .unwrap()
    }

    #[test]
    fn frame_roundtrip() {
        let server = KeeperServer::new(ServerConfig::default()).unwrap();
        let bytes = server.handle_frame(&auth_frame()).unwrap();
        let response = ResponseFrame::decode(&bytes).unwrap();

        assert_eq!(
            response.outcome,
            Ok(Reply::Account {
                owner_id: OwnerId(1)
            })
        );
        assert_eq!(server.session_count(), 1);
    }

    #[test]
    fn garbage_frame_gets_decode_failure() {
        let server = KeeperServer::new(ServerConfig::default()).unwrap();
        let bytes = server.handle_frame(b"\xff\xfe not cbor").unwrap();
        let response = ResponseFrame::decode(&bytes).unwrap();
        assert_eq!(response.outcome.unwrap_err().kind, ErrorKind::DecodeFailed);
    }

    #[test]
    fn journal_requires_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default().with_journal(dir.path().join("vault.log"));
        assert!(matches!(
            KeeperServer::new(config),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn journaled_server_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let key = EncryptionKey::generate();
        let config = ServerConfig::default()
            .with_journal(dir.path().join("vault").join("vault.log"))
            .with_vault_key(key);

        {
            let server = KeeperServer::new(config.clone()).unwrap();
            server.handle_frame(&auth_frame()).unwrap();
        }

        let server = KeeperServer::new(config).unwrap();
        assert_eq!(server.vault().account_count(), 1);
        assert_eq!(server.session_count(), 0);
    }
}
