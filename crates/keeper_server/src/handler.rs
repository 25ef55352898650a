//! Request handlers for the remote operations.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::session::SessionRegistry;
use crate::vault::CredentialVault;
use keeper_core::{KeeperError, OwnerId, SecretRecord, Timestamp};
use keeper_protocol::{
    AddDataRequest, CallMetadata, ClientSyncReport, ClientSyncRequest, Credentials, DataRecord,
    DelDataRequest, GetDataRequest, RemoteCall, Reply, RequestFrame, ResponseFrame,
};
use std::sync::Arc;

/// Shared state for request handling.
#[derive(Debug)]
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The vault.
    pub vault: CredentialVault,
    /// Live sessions.
    pub sessions: SessionRegistry,
}

impl HandlerContext {
    /// Creates a handler context with no sessions.
    pub fn new(config: ServerConfig, vault: CredentialVault) -> Self {
        Self {
            config,
            vault,
            sessions: SessionRegistry::new(),
        }
    }

    /// Resolves the session token carried in `metadata`.
    fn authorize(&self, metadata: &CallMetadata) -> ServerResult<OwnerId> {
        let token = metadata
            .session_token
            .as_deref()
            .ok_or_else(|| KeeperError::unauthenticated("missing session token"))?;
        Ok(self.sessions.get_user(token)?)
    }
}

/// Handler for remote calls.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles one request frame.
    ///
    /// Authenticated calls are rejected with `Unauthenticated` before the
    /// vault is touched. Errors are reduced to their wire form here and
    /// nowhere else.
    pub fn handle(&self, frame: RequestFrame) -> ResponseFrame {
        let call_name = frame.call.name();
        tracing::debug!(call = call_name, "handling call");

        match self.dispatch(frame) {
            Ok((reply, metadata)) => ResponseFrame::ok(reply).with_metadata(metadata),
            Err(err) => {
                if err.is_server_error() {
                    tracing::error!(call = call_name, error = %err, "call failed");
                } else {
                    tracing::debug!(call = call_name, error = %err, "call rejected");
                }
                ResponseFrame::err(err.to_remote())
            }
        }
    }

    fn dispatch(&self, frame: RequestFrame) -> ServerResult<(Reply, CallMetadata)> {
        let RequestFrame { metadata, call } = frame;

        let owner_id = if call.requires_session() {
            Some(self.context.authorize(&metadata)?)
        } else {
            None
        };

        let reply = match (call, owner_id) {
            (RemoteCall::Auth(creds), _) => {
                let (owner_id, token) = self.handle_auth(&creds)?;
                return Ok((Reply::Account { owner_id }, CallMetadata::with_token(token)));
            }
            (RemoteCall::Login(creds), _) => {
                let (owner_id, token) = self.handle_login(&creds)?;
                return Ok((Reply::Account { owner_id }, CallMetadata::with_token(token)));
            }
            (RemoteCall::AddData(req), Some(owner)) => {
                self.handle_add_data(owner, req)?;
                Reply::Done
            }
            (RemoteCall::GetData(req), Some(owner)) => {
                Reply::Record(self.handle_get_data(owner, &req)?)
            }
            (RemoteCall::DelData(req), Some(owner)) => {
                self.handle_del_data(owner, &req)?;
                Reply::Done
            }
            (RemoteCall::Sync, Some(owner)) => Reply::Records(self.handle_sync(owner)?),
            (RemoteCall::ClientSync(req), Some(owner)) => {
                Reply::ClientSync(self.handle_client_sync(owner, req)?)
            }
            (call, None) => {
                return Err(ServerError::Internal(format!(
                    "{} dispatched without a session",
                    call.name()
                )))
            }
        };
        Ok((reply, CallMetadata::default()))
    }

    /// Registers an account and opens a session on it.
    pub fn handle_auth(&self, creds: &Credentials) -> ServerResult<(OwnerId, String)> {
        let owner_id = self.context.vault.auth(&creds.login, &creds.password_hash)?;
        Ok((owner_id, self.context.sessions.issue(owner_id)))
    }

    /// Checks credentials and opens a session.
    pub fn handle_login(&self, creds: &Credentials) -> ServerResult<(OwnerId, String)> {
        let owner_id = self.context.vault.login(&creds.login, &creds.password_hash)?;
        Ok((owner_id, self.context.sessions.issue(owner_id)))
    }

    /// Upserts one record, stamped with the client time when supplied.
    pub fn handle_add_data(&self, owner_id: OwnerId, request: AddDataRequest) -> ServerResult<()> {
        let changed_at = request.changed_at.unwrap_or_else(Timestamp::now);
        let record = SecretRecord::new(
            owner_id,
            request.secret_id,
            request.payload,
            request.metadata,
            changed_at,
        );
        self.context.vault.add_data(&record)?;
        Ok(())
    }

    /// Reads one live record.
    pub fn handle_get_data(
        &self,
        owner_id: OwnerId,
        request: &GetDataRequest,
    ) -> ServerResult<DataRecord> {
        let record = self.context.vault.get_data(owner_id, &request.secret_id)?;
        Ok(record.into())
    }

    /// Tombstones one record.
    pub fn handle_del_data(&self, owner_id: OwnerId, request: &DelDataRequest) -> ServerResult<()> {
        self.context
            .vault
            .del_data(owner_id, &request.secret_id, request.deleted_at)?;
        Ok(())
    }

    /// Returns every record of the caller.
    pub fn handle_sync(&self, owner_id: OwnerId) -> ServerResult<Vec<DataRecord>> {
        let records = self.context.vault.sync(owner_id)?;
        Ok(records.into_iter().map(DataRecord::from).collect())
    }

    /// Upserts a batch of records.
    pub fn handle_client_sync(
        &self,
        owner_id: OwnerId,
        request: ClientSyncRequest,
    ) -> ServerResult<ClientSyncReport> {
        let max = self.context.config.max_client_sync_batch;
        if request.records.len() > max {
            return Err(ServerError::InvalidRequest(format!(
                "too many records: {} > {max}",
                request.records.len()
            )));
        }

        let records = request
            .records
            .into_iter()
            .map(|r| r.into_record(owner_id))
            .collect();
        Ok(self.context.vault.client_sync(owner_id, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::{hash_password, CipherCodec, EncryptionKey, ErrorKind};

    fn create_handler(config: ServerConfig) -> RequestHandler {
        let vault = CredentialVault::in_memory(CipherCodec::new(EncryptionKey::generate()));
        RequestHandler::new(Arc::new(HandlerContext::new(config, vault)))
    }

    fn creds(login: &str, password: &str) -> Credentials {
        Credentials {
            login: login.into(),
            password_hash: hash_password(password),
        }
    }

    fn signed_up(handler: &RequestHandler) -> String {
        let response = handler.handle(RequestFrame::anonymous(RemoteCall::Auth(creds(
            "alice", "pw1",
        ))));
        assert_eq!(
            response.outcome,
            Ok(Reply::Account {
                owner_id: OwnerId(1)
            })
        );
        response.metadata.session_token.unwrap()
    }

    fn add(secret_id: &str, payload: &str, changed_at: Option<i64>) -> RemoteCall {
        RemoteCall::AddData(AddDataRequest {
            secret_id: secret_id.into(),
            payload: payload.into(),
            metadata: "meta".into(),
            changed_at: changed_at.map(Timestamp::from_millis),
        })
    }

    #[test]
    fn auth_returns_token_in_metadata() {
        let handler = create_handler(ServerConfig::default());
        let token = signed_up(&handler);
        assert!(!token.is_empty());
    }

    #[test]
    fn login_issues_distinct_token() {
        let handler = create_handler(ServerConfig::default());
        let first = signed_up(&handler);

        let response = handler.handle(RequestFrame::anonymous(RemoteCall::Login(creds(
            "alice", "pw1",
        ))));
        let second = response.metadata.session_token.unwrap();
        assert_ne!(first, second);

        let response = handler.handle(RequestFrame::anonymous(RemoteCall::Login(creds(
            "alice", "wrong",
        ))));
        assert_eq!(response.outcome.unwrap_err().kind, ErrorKind::WrongPassword);
        assert!(response.metadata.session_token.is_none());
    }

    #[test]
    fn missing_or_unknown_token_is_rejected_before_vault() {
        let handler = create_handler(ServerConfig::default());
        signed_up(&handler);

        let response = handler.handle(RequestFrame::anonymous(add("note1", "x", None)));
        assert_eq!(response.outcome.unwrap_err().kind, ErrorKind::Unauthenticated);

        let response = handler.handle(RequestFrame::authenticated("bogus", add("note1", "x", None)));
        assert_eq!(response.outcome.unwrap_err().kind, ErrorKind::Unauthenticated);

        assert_eq!(handler.context.vault.record_count(), 0);
    }

    #[test]
    fn add_get_delete_flow() {
        let handler = create_handler(ServerConfig::default());
        let token = signed_up(&handler);

        let response = handler.handle(RequestFrame::authenticated(&token, add("note1", "hunter2", None)));
        assert_eq!(response.outcome, Ok(Reply::Done));

        let response = handler.handle(RequestFrame::authenticated(
            &token,
            RemoteCall::GetData(GetDataRequest {
                secret_id: "note1".into(),
            }),
        ));
        match response.outcome {
            Ok(Reply::Record(record)) => {
                assert_eq!(record.payload, "hunter2");
                assert!(!record.deleted);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let response = handler.handle(RequestFrame::authenticated(
            &token,
            RemoteCall::DelData(DelDataRequest {
                secret_id: "note1".into(),
                deleted_at: None,
            }),
        ));
        assert_eq!(response.outcome, Ok(Reply::Done));

        let response = handler.handle(RequestFrame::authenticated(
            &token,
            RemoteCall::GetData(GetDataRequest {
                secret_id: "note1".into(),
            }),
        ));
        assert_eq!(response.outcome.unwrap_err().kind, ErrorKind::NotFound);

        let response = handler.handle(RequestFrame::authenticated(&token, RemoteCall::Sync));
        match response.outcome {
            Ok(Reply::Records(records)) => {
                assert_eq!(records.len(), 1);
                assert!(records[0].deleted);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn add_honors_client_timestamp() {
        let handler = create_handler(ServerConfig::default());
        let token = signed_up(&handler);

        handler.handle(RequestFrame::authenticated(&token, add("note1", "new", Some(200))));
        handler.handle(RequestFrame::authenticated(&token, add("note1", "old", Some(100))));

        let record = handler
            .handle_get_data(
                OwnerId(1),
                &GetDataRequest {
                    secret_id: "note1".into(),
                },
            )
            .unwrap();
        assert_eq!(record.payload, "new");
        assert_eq!(record.changed_at, Timestamp::from_millis(200));
    }

    #[test]
    fn client_sync_batch_limit() {
        let handler = create_handler(ServerConfig::default().with_max_client_sync_batch(1));
        let token = signed_up(&handler);

        let record = |id: &str| DataRecord {
            secret_id: id.into(),
            payload: "p".into(),
            metadata: "m".into(),
            changed_at: Timestamp::from_millis(1),
            deleted: false,
        };
        let response = handler.handle(RequestFrame::authenticated(
            &token,
            RemoteCall::ClientSync(ClientSyncRequest {
                records: vec![record("a"), record("b")],
            }),
        ));
        assert_eq!(response.outcome.unwrap_err().kind, ErrorKind::InvalidArgument);

        let response = handler.handle(RequestFrame::authenticated(
            &token,
            RemoteCall::ClientSync(ClientSyncRequest {
                records: vec![record("a")],
            }),
        ));
        match response.outcome {
            Ok(Reply::ClientSync(report)) => assert_eq!(report.applied, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
