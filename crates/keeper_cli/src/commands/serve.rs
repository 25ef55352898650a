//! Serve command implementation.

use keeper_core::{EncryptionKey, KeyTier};
use keeper_server::{net, KeeperServer, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Salt for the vault key derivation.
const VAULT_SALT: &[u8] = b"keeper-vault";

/// Runs the vault server until interrupted.
pub fn run(
    bind: SocketAddr,
    journal: Option<PathBuf>,
    passphrase: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::new(bind);

    match (journal, passphrase) {
        (Some(path), Some(passphrase)) => {
            let key = EncryptionKey::derive(passphrase.as_bytes(), VAULT_SALT, KeyTier::Vault)?;
            config = config.with_journal(path).with_vault_key(key);
        }
        (Some(_), None) => {
            return Err("--journal requires a vault passphrase (KEEPER_VAULT_PASSPHRASE)".into());
        }
        (None, _) => {
            tracing::warn!("no journal configured, vault contents are lost on exit");
        }
    }

    let server = Arc::new(KeeperServer::new(config)?);
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async move {
        let listener = net::bind(&server).await?;
        tokio::select! {
            result = net::serve(listener, Arc::clone(&server)) => result?,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!(
                    accounts = server.vault().account_count(),
                    records = server.vault().record_count(),
                    "shutting down"
                );
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
