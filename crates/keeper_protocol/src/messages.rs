//! Protocol messages.

use crate::error::{ProtocolError, ProtocolResult};
use keeper_core::{ErrorKind, KeeperError, OwnerId, SecretRecord, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(bytes)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Out-of-band call metadata.
///
/// The session token travels here, never in a request body. Auth and Login
/// responses return the freshly minted token the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetadata {
    /// Session token, if any.
    pub session_token: Option<String>,
}

impl CallMetadata {
    /// Metadata carrying `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
        }
    }
}

/// Login and password hash, as sent by Auth and Login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account login.
    pub login: String,
    /// Hex SHA-256 of the password.
    pub password_hash: String,
}

/// Body of an AddData call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddDataRequest {
    /// Secret id.
    pub secret_id: String,
    /// Plaintext payload.
    pub payload: String,
    /// Plaintext metadata.
    pub metadata: String,
    /// Client-side write time; the server clock is used when absent.
    pub changed_at: Option<Timestamp>,
}

/// Body of a GetData call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetDataRequest {
    /// Secret id.
    pub secret_id: String,
}

/// Body of a DelData call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelDataRequest {
    /// Secret id.
    pub secret_id: String,
    /// Client-side delete time; `last_changed` only moves if newer.
    pub deleted_at: Option<Timestamp>,
}

/// Body of a ClientSync call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSyncRequest {
    /// Records to upsert.
    pub records: Vec<DataRecord>,
}

/// A secret as it crosses the wire: plaintext, without the owner id (the
/// owner is implied by the session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Secret id.
    pub secret_id: String,
    /// Plaintext payload.
    pub payload: String,
    /// Plaintext metadata.
    pub metadata: String,
    /// Time of the last accepted write.
    pub changed_at: Timestamp,
    /// Tombstone flag.
    pub deleted: bool,
}

impl DataRecord {
    /// Attaches the owner id.
    #[must_use]
    pub fn into_record(self, owner_id: OwnerId) -> SecretRecord {
        SecretRecord {
            owner_id,
            secret_id: self.secret_id,
            payload: self.payload,
            metadata: self.metadata,
            last_changed: self.changed_at,
            deleted: self.deleted,
        }
    }
}

impl From<SecretRecord> for DataRecord {
    fn from(record: SecretRecord) -> Self {
        Self {
            secret_id: record.secret_id,
            payload: record.payload,
            metadata: record.metadata,
            changed_at: record.last_changed,
            deleted: record.deleted,
        }
    }
}

/// A remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteCall {
    /// Register a new account.
    Auth(Credentials),
    /// Open a session on an existing account.
    Login(Credentials),
    /// Upsert one secret.
    AddData(AddDataRequest),
    /// Read one live secret.
    GetData(GetDataRequest),
    /// Tombstone one secret.
    DelData(DelDataRequest),
    /// Read every secret of the caller, tombstones included.
    Sync,
    /// Upsert a batch of secrets.
    ClientSync(ClientSyncRequest),
}

impl RemoteCall {
    /// Returns the call name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCall::Auth(_) => "Auth",
            RemoteCall::Login(_) => "Login",
            RemoteCall::AddData(_) => "AddData",
            RemoteCall::GetData(_) => "GetData",
            RemoteCall::DelData(_) => "DelData",
            RemoteCall::Sync => "Sync",
            RemoteCall::ClientSync(_) => "ClientSync",
        }
    }

    /// Returns true if the call needs a session token.
    #[must_use]
    pub fn requires_session(&self) -> bool {
        !matches!(self, RemoteCall::Auth(_) | RemoteCall::Login(_))
    }
}

/// A failed record inside a ClientSync batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Secret id of the record.
    pub secret_id: String,
    /// Why it failed.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

/// Per-record outcome of a ClientSync batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSyncReport {
    /// Records that were strictly newer and stored.
    pub applied: usize,
    /// Records that were older than or equal to the stored copy.
    pub stale: usize,
    /// Records that could not be stored.
    pub failed: Vec<FailedRecord>,
}

impl ClientSyncReport {
    /// Returns true if every record was applied or found stale.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns true if `secret_id` is in the failed list.
    #[must_use]
    pub fn has_failed(&self, secret_id: &str) -> bool {
        self.failed.iter().any(|f| f.secret_id == secret_id)
    }
}

/// A successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Auth or Login succeeded.
    Account {
        /// The caller's owner id.
        owner_id: OwnerId,
    },
    /// The call succeeded with nothing to return.
    Done,
    /// A single record.
    Record(DataRecord),
    /// All records of the caller.
    Records(Vec<DataRecord>),
    /// Outcome of a ClientSync batch.
    ClientSync(ClientSyncReport),
}

/// A failed call, reduced to its kind and a short message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error kind.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl RemoteError {
    /// Creates a remote error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&KeeperError> for RemoteError {
    fn from(err: &KeeperError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<RemoteError> for KeeperError {
    fn from(err: RemoteError) -> Self {
        KeeperError::from_kind(err.kind, err.message)
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A request on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Out-of-band metadata.
    pub metadata: CallMetadata,
    /// The operation.
    pub call: RemoteCall,
}

impl RequestFrame {
    /// Creates a request without a session token.
    #[must_use]
    pub fn anonymous(call: RemoteCall) -> Self {
        Self {
            metadata: CallMetadata::default(),
            call,
        }
    }

    /// Creates a request carrying `token`.
    pub fn authenticated(token: impl Into<String>, call: RemoteCall) -> Self {
        Self {
            metadata: CallMetadata::with_token(token),
            call,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

/// A response on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Out-of-band metadata.
    pub metadata: CallMetadata,
    /// The reply or the error.
    pub outcome: Result<Reply, RemoteError>,
}

impl ResponseFrame {
    /// Creates a successful response.
    #[must_use]
    pub fn ok(reply: Reply) -> Self {
        Self {
            metadata: CallMetadata::default(),
            outcome: Ok(reply),
        }
    }

    /// Creates a failed response.
    #[must_use]
    pub fn err(error: RemoteError) -> Self {
        Self {
            metadata: CallMetadata::default(),
            outcome: Err(error),
        }
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: CallMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, millis: i64, deleted: bool) -> DataRecord {
        DataRecord {
            secret_id: id.into(),
            payload: "hunter2".into(),
            metadata: "email".into(),
            changed_at: Timestamp::from_millis(millis),
            deleted,
        }
    }

    #[test]
    fn request_frames_survive_cbor() {
        let frames = vec![
            RequestFrame::anonymous(RemoteCall::Auth(Credentials {
                login: "alice".into(),
                password_hash: "abc".into(),
            })),
            RequestFrame::authenticated(
                "tok",
                RemoteCall::DelData(DelDataRequest {
                    secret_id: "note1".into(),
                    deleted_at: None,
                }),
            ),
            RequestFrame::authenticated("tok", RemoteCall::Sync),
            RequestFrame::authenticated(
                "tok",
                RemoteCall::ClientSync(ClientSyncRequest {
                    records: vec![record("a", 1, false), record("b", 2, true)],
                }),
            ),
        ];

        for frame in frames {
            let decoded = RequestFrame::decode(&frame.encode().unwrap()).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn response_carries_error_kind() {
        let frame = ResponseFrame::err(RemoteError::new(ErrorKind::Unauthenticated, "no token"));
        let decoded = ResponseFrame::decode(&frame.encode().unwrap()).unwrap();

        let err = decoded.outcome.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
        assert_eq!(KeeperError::from(err).kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn response_carries_token_in_metadata() {
        let frame = ResponseFrame::ok(Reply::Account {
            owner_id: OwnerId(1),
        })
        .with_metadata(CallMetadata::with_token("tok"));
        let decoded = ResponseFrame::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.metadata.session_token.as_deref(), Some("tok"));
        assert_eq!(
            decoded.outcome,
            Ok(Reply::Account {
                owner_id: OwnerId(1)
            })
        );
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(matches!(
            RequestFrame::decode(&[0xFF, 0x00, 0x13]),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn only_auth_and_login_are_anonymous() {
        let creds = Credentials {
            login: "a".into(),
            password_hash: "h".into(),
        };
        assert!(!RemoteCall::Auth(creds.clone()).requires_session());
        assert!(!RemoteCall::Login(creds).requires_session());
        assert!(RemoteCall::Sync.requires_session());
        assert!(RemoteCall::GetData(GetDataRequest {
            secret_id: "x".into()
        })
        .requires_session());
    }

    #[test]
    fn data_record_keeps_fields_through_owner_attach() {
        let wire = record("note1", 5, true);
        let owned = wire.clone().into_record(OwnerId(3));
        assert_eq!(owned.owner_id, OwnerId(3));
        assert!(owned.deleted);
        assert_eq!(DataRecord::from(owned), wire);
    }
}
