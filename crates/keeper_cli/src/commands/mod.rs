//! CLI command implementations.

pub mod secret;
pub mod serve;

use std::path::PathBuf;

/// Where client commands connect and keep their replica.
pub struct Target {
    /// Vault address.
    pub server: String,
    /// Replica directory.
    pub data_dir: PathBuf,
}

/// Account credentials supplied on the command line.
pub struct Credentials {
    /// Account login.
    pub login: String,
    /// Plaintext password; hashed before it leaves the process.
    pub password: String,
    /// Passphrase the replica key is derived from.
    pub replica_passphrase: String,
}

/// How records are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Payload and metadata as plain lines.
    Text,
    /// One pretty-printed JSON object per record.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format: {other}")),
        }
    }
}
