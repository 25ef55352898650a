//! Transport abstraction.
//!
//! [`KeeperTransport`] is the client's view of the seven remote calls.
//! [`FramedTransport`] implements it on top of any [`FrameClient`], which
//! only has to move encoded request bytes to the vault and response bytes
//! back. That keeps the byte-moving part swappable: TCP in production, an
//! in-process loopback in tests.

use crate::error::{ClientError, ClientResult};
use keeper_core::OwnerId;
use keeper_protocol::{
    AddDataRequest, CallMetadata, ClientSyncReport, ClientSyncRequest, Credentials, DataRecord,
    DelDataRequest, GetDataRequest, RemoteCall, Reply, RequestFrame, ResponseFrame,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// The remote operations, as seen by the client.
///
/// Authenticated calls take the session token separately; implementations
/// carry it in call metadata.
pub trait KeeperTransport: Send + Sync {
    /// Registers an account. Returns the owner id and a session token.
    fn auth(&self, credentials: &Credentials) -> ClientResult<(OwnerId, String)>;

    /// Opens a session. Returns the owner id and a session token.
    fn login(&self, credentials: &Credentials) -> ClientResult<(OwnerId, String)>;

    /// Upserts one record.
    fn add_data(&self, token: &str, request: &AddDataRequest) -> ClientResult<()>;

    /// Reads one live record.
    fn get_data(&self, token: &str, secret_id: &str) -> ClientResult<DataRecord>;

    /// Tombstones one record.
    fn del_data(&self, token: &str, request: &DelDataRequest) -> ClientResult<()>;

    /// Reads every record of the session owner, tombstones included.
    fn sync(&self, token: &str) -> ClientResult<Vec<DataRecord>>;

    /// Upserts a batch of records.
    fn client_sync(&self, token: &str, records: Vec<DataRecord>) -> ClientResult<ClientSyncReport>;
}

/// Moves one encoded request to the vault and returns the encoded response.
///
/// Any failure here means the vault was not reached.
pub trait FrameClient: Send + Sync {
    /// Performs one request/response exchange.
    fn call(&self, request: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// CBOR-framed transport over a [`FrameClient`].
pub struct FramedTransport<C: FrameClient> {
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: FrameClient> FramedTransport<C> {
    /// Creates a transport over `client`.
    pub fn new(client: C) -> Self {
        Self {
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the underlying frame client.
    pub fn frame_client(&self) -> &C {
        &self.client
    }

    /// Returns the last transport failure, if the last call failed.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn exchange(&self, frame: RequestFrame) -> ClientResult<(Reply, CallMetadata)> {
        let body = frame
            .encode()
            .map_err(|e| ClientError::Protocol(format!("failed to encode request: {e}")))?;

        let response_body = self.client.call(body).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            ClientError::transport(e)
        })?;
        *self.last_error.write() = None;

        let response = ResponseFrame::decode(&response_body)
            .map_err(|e| ClientError::Protocol(format!("failed to decode response: {e}")))?;

        match response.outcome {
            Ok(reply) => Ok((reply, response.metadata)),
            Err(err) => Err(ClientError::Remote(err)),
        }
    }

    fn open_session(&self, call: RemoteCall) -> ClientResult<(OwnerId, String)> {
        let name = call.name();
        match self.exchange(RequestFrame::anonymous(call))? {
            (Reply::Account { owner_id }, metadata) => metadata
                .session_token
                .map(|token| (owner_id, token))
                .ok_or(ClientError::UnexpectedReply { call: name }),
            _ => Err(ClientError::UnexpectedReply { call: name }),
        }
    }
}

impl<C: FrameClient> KeeperTransport for FramedTransport<C> {
    fn auth(&self, credentials: &Credentials) -> ClientResult<(OwnerId, String)> {
        self.open_session(RemoteCall::Auth(credentials.clone()))
    }

    fn login(&self, credentials: &Credentials) -> ClientResult<(OwnerId, String)> {
        self.open_session(RemoteCall::Login(credentials.clone()))
    }

    fn add_data(&self, token: &str, request: &AddDataRequest) -> ClientResult<()> {
        let frame = RequestFrame::authenticated(token, RemoteCall::AddData(request.clone()));
        match self.exchange(frame)?.0 {
            Reply::Done => Ok(()),
            _ => Err(ClientError::UnexpectedReply { call: "AddData" }),
        }
    }

    fn get_data(&self, token: &str, secret_id: &str) -> ClientResult<DataRecord> {
        let frame = RequestFrame::authenticated(
            token,
            RemoteCall::GetData(GetDataRequest {
                secret_id: secret_id.to_string(),
            }),
        );
        match self.exchange(frame)?.0 {
            Reply::Record(record) => Ok(record),
            _ => Err(ClientError::UnexpectedReply { call: "GetData" }),
        }
    }

    fn del_data(&self, token: &str, request: &DelDataRequest) -> ClientResult<()> {
        let frame = RequestFrame::authenticated(token, RemoteCall::DelData(request.clone()));
        match self.exchange(frame)?.0 {
            Reply::Done => Ok(()),
            _ => Err(ClientError::UnexpectedReply { call: "DelData" }),
        }
    }

    fn sync(&self, token: &str) -> ClientResult<Vec<DataRecord>> {
        match self
            .exchange(RequestFrame::authenticated(token, RemoteCall::Sync))?
            .0
        {
            Reply::Records(records) => Ok(records),
            _ => Err(ClientError::UnexpectedReply { call: "Sync" }),
        }
    }

    fn client_sync(&self, token: &str, records: Vec<DataRecord>) -> ClientResult<ClientSyncReport> {
        let frame = RequestFrame::authenticated(
            token,
            RemoteCall::ClientSync(ClientSyncRequest { records }),
        );
        match self.exchange(frame)?.0 {
            Reply::ClientSync(report) => Ok(report),
            _ => Err(ClientError::UnexpectedReply { call: "ClientSync" }),
        }
    }
}

/// A server that can answer frames in-process.
pub trait LoopbackServer: Send + Sync {
    /// Handles one encoded request and returns the encoded response.
    fn handle_frame(&self, request: &[u8]) -> Result<Vec<u8>, String>;
}

/// A frame client that routes requests directly to an in-process server.
///
/// Its outage switch makes every call fail as if the network were down,
/// which is how offline behavior is exercised without sockets.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    reachable: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a loopback client connected to `server`.
    pub fn new(server: S) -> Self {
        Self {
            server,
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulates the network going down (`false`) or coming back (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Returns true if calls currently reach the server.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

impl<S: LoopbackServer> FrameClient for LoopbackClient<S> {
    fn call(&self, request: Vec<u8>) -> Result<Vec<u8>, String> {
        if !self.is_reachable() {
            return Err("server unreachable".into());
        }
        self.server.handle_frame(&request)
    }
}
