//! The client gateway.
//!
//! [`KeeperClient`] is what the CLI talks to. It hashes passwords before
//! they leave the process, keeps the replica current on every successful
//! remote call, and falls back to the replica whenever the vault cannot be
//! reached. Initial account creation is the one operation with no offline
//! path.

use crate::config::ClientConfig;
use crate::engine::{SyncEngine, SyncReport};
use crate::error::{ClientError, ClientResult};
use crate::replica::ReplicaCache;
use crate::tcp::TcpFrameClient;
use crate::transport::{FramedTransport, KeeperTransport};
use keeper_core::crypto::verify_password_hash;
use keeper_core::{
    hash_password, CipherCodec, KeeperError, OwnerId, SecretRecord, Timestamp, UserAccount,
};
use keeper_protocol::{AddDataRequest, Credentials, DelDataRequest};
use std::sync::Arc;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Account login.
    pub login: String,
    /// Account owner id.
    pub owner_id: OwnerId,
    token: Option<String>,
}

impl Session {
    /// Returns true if the session holds a vault token.
    pub fn is_online(&self) -> bool {
        self.token.is_some()
    }

    /// Returns the vault token, if online.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Client-side entry point: replica, sync engine and transport.
pub struct KeeperClient<T: KeeperTransport> {
    transport: Arc<T>,
    replica: Arc<ReplicaCache>,
    engine: SyncEngine<T>,
}

impl KeeperClient<FramedTransport<TcpFrameClient>> {
    /// Opens the replica in `config.data_dir` and connects over TCP.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` if no replica key is configured, or with
    /// the replay error if the replica cannot be opened.
    pub fn open(config: &ClientConfig) -> ClientResult<Self> {
        let key = config
            .replica_key
            .clone()
            .ok_or_else(|| KeeperError::invalid_argument("a replica key is required"))?;
        let replica = ReplicaCache::open(
            &config.data_dir,
            CipherCodec::new(key),
            config.corrupt_log_policy,
            config.sync_logs,
        )?;
        let transport =
            FramedTransport::new(TcpFrameClient::new(config.server_addr.clone(), config.timeout));
        Ok(Self::new(transport, replica, config))
    }
}

impl<T: KeeperTransport> KeeperClient<T> {
    /// Creates a client over an already opened replica.
    pub fn new(transport: T, replica: ReplicaCache, config: &ClientConfig) -> Self {
        let transport = Arc::new(transport);
        let replica = Arc::new(replica);
        let engine = SyncEngine::new(
            Arc::clone(&transport),
            Arc::clone(&replica),
            config.push_scope,
        );
        Self {
            transport,
            replica,
            engine,
        }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the replica.
    pub fn replica(&self) -> &ReplicaCache {
        &self.replica
    }

    /// Returns the sync engine.
    pub fn engine(&self) -> &SyncEngine<T> {
        &self.engine
    }

    fn credentials(login: &str, password: &str) -> ClientResult<Credentials> {
        let password_hash = hash_password(password);
        UserAccount::validate_credentials(login, &password_hash)?;
        Ok(Credentials {
            login: login.to_string(),
            password_hash,
        })
    }

    fn remember(
        &self,
        creds: Credentials,
        owner_id: OwnerId,
        token: String,
    ) -> ClientResult<Session> {
        self.replica.cache_account(&UserAccount {
            owner_id,
            login: creds.login.clone(),
            password_hash: creds.password_hash,
        })?;
        Ok(Session {
            login: creds.login,
            owner_id,
            token: Some(token),
        })
    }

    /// Registers a new account on the vault.
    ///
    /// Needs the vault: a transport failure is returned as is.
    pub fn authenticate(&self, login: &str, password: &str) -> ClientResult<Session> {
        let creds = Self::credentials(login, password)?;
        let (owner_id, token) = self.transport.auth(&creds)?;
        tracing::info!(owner_id = %owner_id, "account registered");
        self.remember(creds, owner_id, token)
    }

    /// Logs in, falling back to the cached account when the vault is
    /// unreachable.
    ///
    /// A rejection from the vault is final; only a transport failure
    /// triggers the fallback, which returns an offline session.
    pub fn login(&self, login: &str, password: &str) -> ClientResult<Session> {
        let creds = Self::credentials(login, password)?;

        match self.transport.login(&creds) {
            Ok((owner_id, token)) => self.remember(creds, owner_id, token),
            Err(err) if err.is_unreachable() => {
                tracing::warn!(error = %err, "vault unreachable, using cached credentials");
                let account = self
                    .replica
                    .account(login)
                    .ok_or_else(|| KeeperError::not_found(format!("login {login}")))?;
                if !verify_password_hash(&account.password_hash, &creds.password_hash) {
                    return Err(KeeperError::WrongPassword.into());
                }
                Ok(Session {
                    login: account.login,
                    owner_id: account.owner_id,
                    token: None,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Stores a secret stamped with the current time, or just after the
    /// cached copy when that copy is as new or newer.
    ///
    /// When online the write is sent to the vault first. The local entry is
    /// clean if the vault accepted it and dirty otherwise.
    pub fn add(
        &self,
        session: &Session,
        secret_id: &str,
        payload: &str,
        metadata: &str,
    ) -> ClientResult<()> {
        SecretRecord::validate_id(secret_id)?;
        let now = Timestamp::now();
        let stamp = match self.replica.entry(session.owner_id, secret_id) {
            Some(cached) => now.superseding(cached.sealed.last_changed),
            None => now,
        };
        let record = SecretRecord::new(session.owner_id, secret_id, payload, metadata, stamp);

        let accepted = match session.token() {
            Some(token) => {
                let request = AddDataRequest {
                    secret_id: record.secret_id.clone(),
                    payload: record.payload.clone(),
                    metadata: record.metadata.clone(),
                    changed_at: Some(record.last_changed),
                };
                match self.transport.add_data(token, &request) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(key = %record.key(), error = %err, "vault write failed, kept locally");
                        false
                    }
                }
            }
            None => false,
        };

        self.replica.store(&record, !accepted)?;
        Ok(())
    }

    /// Reads a live secret.
    ///
    /// When online the vault copy is fetched and cached if strictly newer.
    /// Any remote failure falls back to the replica.
    pub fn get(&self, session: &Session, secret_id: &str) -> ClientResult<SecretRecord> {
        SecretRecord::validate_id(secret_id)?;

        if let Some(token) = session.token() {
            match self.transport.get_data(token, secret_id) {
                Ok(data) => {
                    let record = data.into_record(session.owner_id);
                    self.replica.store_if_newer(&record, false)?;
                }
                Err(err) => {
                    tracing::debug!(secret_id, error = %err, "vault read failed, using replica");
                }
            }
        }

        match self.replica.get(session.owner_id, secret_id)? {
            Some(record) if !record.deleted => Ok(record),
            _ => Err(KeeperError::not_found(format!("secret {secret_id}")).into()),
        }
    }

    /// Deletes a secret.
    ///
    /// The local tombstone is stamped now, or just after the cached copy
    /// when that copy is as new or newer. When online the delete is sent
    /// with the same stamp and the tombstone is clean on success.
    pub fn delete(&self, session: &Session, secret_id: &str) -> ClientResult<()> {
        SecretRecord::validate_id(secret_id)?;
        let applied = self
            .replica
            .mark_deleted(session.owner_id, secret_id, Timestamp::now())?;

        let Some(token) = session.token() else {
            if applied.is_some() {
                return Ok(());
            }
            return Err(KeeperError::not_found(format!("secret {secret_id}")).into());
        };

        let stamp = applied.unwrap_or_else(Timestamp::now);
        let request = DelDataRequest {
            secret_id: secret_id.to_string(),
            deleted_at: Some(stamp),
        };
        match self.transport.del_data(token, &request) {
            Ok(()) => {
                if applied.is_some() {
                    self.replica
                        .mark_clean(session.owner_id, &[(secret_id.to_string(), stamp)])?;
                }
                Ok(())
            }
            Err(err) if applied.is_some() => {
                tracing::warn!(secret_id, error = %err, "vault delete failed, kept locally");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Runs a full sync cycle. Needs an online session.
    pub fn sync(&self, session: &Session) -> ClientResult<SyncReport> {
        let token = session.token().ok_or_else(|| {
            ClientError::from(KeeperError::unauthenticated(
                "offline session, log in while the vault is reachable",
            ))
        })?;
        self.engine.sync(session.owner_id, token)
    }
}
