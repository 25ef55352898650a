//! Client configuration.

use keeper_core::{CorruptLogPolicy, EncryptionKey};
use std::path::PathBuf;
use std::time::Duration;

/// Which replica entries a push sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PushScope {
    /// Only entries written locally since they were last acknowledged.
    #[default]
    Dirty,
    /// Every entry of the owner.
    Full,
}

/// Configuration for the client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Vault address (`host:port`).
    pub server_addr: String,
    /// Directory holding the replica logs.
    pub data_dir: PathBuf,
    /// Deadline applied to every remote call.
    pub timeout: Duration,
    /// Push scope.
    pub push_scope: PushScope,
    /// What to do with unparseable replica log lines.
    pub corrupt_log_policy: CorruptLogPolicy,
    /// Sync the replica logs to disk after every append.
    pub sync_logs: bool,
    /// Key sealing the replica at rest.
    pub replica_key: Option<EncryptionKey>,
}

impl ClientConfig {
    /// Creates a configuration for `server_addr` storing data in `data_dir`.
    pub fn new(server_addr: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            server_addr: server_addr.into(),
            data_dir: data_dir.into(),
            timeout: Duration::from_secs(10),
            push_scope: PushScope::default(),
            corrupt_log_policy: CorruptLogPolicy::default(),
            sync_logs: true,
            replica_key: None,
        }
    }

    /// Sets the call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the push scope.
    pub fn with_push_scope(mut self, scope: PushScope) -> Self {
        self.push_scope = scope;
        self
    }

    /// Sets the corrupt log policy.
    pub fn with_corrupt_log_policy(mut self, policy: CorruptLogPolicy) -> Self {
        self.corrupt_log_policy = policy;
        self
    }

    /// Sets whether replica appends are synced to disk.
    pub fn with_sync_logs(mut self, sync: bool) -> Self {
        self.sync_logs = sync;
        self
    }

    /// Sets the replica key.
    pub fn with_replica_key(mut self, key: EncryptionKey) -> Self {
        self.replica_key = Some(key);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:3200", "keeper-data")
    }
}
