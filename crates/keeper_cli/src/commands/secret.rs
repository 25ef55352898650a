//! Client command implementations.
//!
//! Every command except `auth` logs in first. When the vault is unreachable
//! the login falls back to the cached account and the command runs against
//! the local replica.

use super::{Credentials, OutputFormat, Target};
use keeper_client::{ClientConfig, KeeperClient, Session};
use keeper_core::{EncryptionKey, KeyTier, SecretRecord};
use serde::Serialize;

type CliResult = Result<(), Box<dyn std::error::Error>>;
type TcpKeeper = KeeperClient<keeper_client::FramedTransport<keeper_client::TcpFrameClient>>;

/// A secret as printed with `--format json`.
#[derive(Debug, Serialize)]
struct SecretView<'a> {
    id: &'a str,
    payload: &'a str,
    metadata: &'a str,
    last_changed: i64,
    deleted: bool,
}

/// Formats one record. A tombstone's retained payload is never shown.
fn render_record(
    record: &SecretRecord,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => {
            let (payload, metadata) = if record.deleted {
                ("", "")
            } else {
                (record.payload.as_str(), record.metadata.as_str())
            };
            serde_json::to_string_pretty(&SecretView {
                id: &record.secret_id,
                payload,
                metadata,
                last_changed: record.last_changed.as_millis(),
                deleted: record.deleted,
            })
        }
        OutputFormat::Text if record.deleted => Ok(format!("{} deleted", record.secret_id)),
        OutputFormat::Text if record.metadata.is_empty() => Ok(record.payload.clone()),
        OutputFormat::Text => Ok(format!("{}\nmetadata: {}", record.payload, record.metadata)),
    }
}

fn open(target: &Target, creds: &Credentials) -> Result<TcpKeeper, Box<dyn std::error::Error>> {
    let key = EncryptionKey::derive(
        creds.replica_passphrase.as_bytes(),
        creds.login.as_bytes(),
        KeyTier::Replica,
    )?;
    let config = ClientConfig::new(target.server.clone(), target.data_dir.clone())
        .with_replica_key(key);
    Ok(KeeperClient::open(&config)?)
}

fn login(client: &TcpKeeper, creds: &Credentials) -> Result<Session, Box<dyn std::error::Error>> {
    let session = client.login(&creds.login, &creds.password)?;
    if !session.is_online() {
        let addr = client.transport().frame_client().addr();
        eprintln!("vault {addr} unreachable, working offline");
    }
    Ok(session)
}

/// Registers a new account. Needs the vault.
pub fn auth(target: &Target, creds: &Credentials) -> CliResult {
    let client = open(target, creds)?;
    let session = client.authenticate(&creds.login, &creds.password)?;
    println!("registered {} (owner {})", session.login, session.owner_id);
    Ok(())
}

/// Stores a secret.
pub fn add(
    target: &Target,
    creds: &Credentials,
    id: &str,
    payload: &str,
    metadata: &str,
) -> CliResult {
    let client = open(target, creds)?;
    let session = login(&client, creds)?;
    client.add(&session, id, payload, metadata)?;

    let pending = client
        .replica()
        .entry(session.owner_id, id)
        .is_some_and(|e| e.dirty);
    if pending {
        println!("stored {id} locally, run `keeper sync` once the vault is reachable");
    } else {
        println!("stored {id}");
    }
    Ok(())
}

/// Reads a secret.
pub fn get(target: &Target, creds: &Credentials, id: &str, format: OutputFormat) -> CliResult {
    let client = open(target, creds)?;
    let session = login(&client, creds)?;
    let record = client.get(&session, id)?;
    println!("{}", render_record(&record, format)?);
    Ok(())
}

/// Deletes a secret.
pub fn delete(target: &Target, creds: &Credentials, id: &str) -> CliResult {
    let client = open(target, creds)?;
    let session = login(&client, creds)?;
    client.delete(&session, id)?;
    println!("deleted {id}");
    Ok(())
}

/// Pushes local changes and pulls vault state, printing every record the
/// pull changed.
pub fn sync(target: &Target, creds: &Credentials, format: OutputFormat) -> CliResult {
    let client = open(target, creds)?;
    let session = login(&client, creds)?;
    let report = client.sync(&session)?;

    println!(
        "pushed {} ({} applied, {} stale, {} failed), pulled {} in {:?}",
        report.push.pushed,
        report.push.report.applied,
        report.push.report.stale,
        report.push.report.failed.len(),
        report.pull.changed.len(),
        report.duration,
    );
    for failed in &report.push.report.failed {
        eprintln!("  {}: {}", failed.secret_id, failed.message);
    }
    for record in &report.pull.changed {
        match format {
            OutputFormat::Text if !record.deleted => {
                println!("{}:", record.secret_id);
                for line in render_record(record, format)?.lines() {
                    println!("  {line}");
                }
            }
            _ => println!("{}", render_record(record, format)?),
        }
    }
    Ok(())
}
