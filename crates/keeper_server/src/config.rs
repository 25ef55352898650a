//! Server configuration.

use keeper_core::EncryptionKey;
use keeper_protocol::DEFAULT_MAX_FRAME_SIZE;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the vault server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Deadline for reading, handling and answering one call once its
    /// length prefix has arrived.
    pub request_timeout: Duration,
    /// How long an open connection may sit between calls.
    pub idle_timeout: Duration,
    /// Largest accepted frame in bytes.
    pub max_frame_size: usize,
    /// Largest accepted ClientSync batch.
    pub max_client_sync_batch: usize,
    /// Vault journal location; the vault is memory-only when unset.
    pub journal_path: Option<PathBuf>,
    /// Sync the journal to disk after every append.
    pub sync_journal: bool,
    /// Key sealing records at rest. A random key is generated when unset,
    /// which is only valid for a memory-only vault.
    pub vault_key: Option<EncryptionKey>,
}

impl ServerConfig {
    /// Creates a configuration bound to `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_client_sync_batch: 10_000,
            journal_path: None,
            sync_journal: true,
            vault_key: None,
        }
    }

    /// Sets the per-call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets how long a connection may wait between calls.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the maximum frame size.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Sets the maximum ClientSync batch size.
    pub fn with_max_client_sync_batch(mut self, size: usize) -> Self {
        self.max_client_sync_batch = size;
        self
    }

    /// Persists the vault to a journal at `path`.
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    /// Sets whether journal appends are synced to disk.
    pub fn with_sync_journal(mut self, sync: bool) -> Self {
        self.sync_journal = sync;
        self
    }

    /// Sets the vault key.
    pub fn with_vault_key(mut self, key: EncryptionKey) -> Self {
        self.vault_key = Some(key);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 3200)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3200);
        assert!(config.journal_path.is_none());
        assert!(config.vault_key.is_none());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_request_timeout(Duration::from_secs(5))
            .with_idle_timeout(Duration::from_secs(10))
            .with_max_client_sync_batch(50)
            .with_journal("/tmp/vault.log")
            .with_vault_key(EncryptionKey::generate());

        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(10));
        assert_eq!(config.max_client_sync_batch, 50);
        assert_eq!(config.journal_path, Some(PathBuf::from("/tmp/vault.log")));
        assert!(config.vault_key.is_some());
    }
}
