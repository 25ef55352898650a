//! Keeper CLI
//!
//! Runs the vault server and drives the client against it.
//!
//! # Commands
//!
//! - `serve` - Run the vault server
//! - `auth` - Register a new account
//! - `add` - Store a secret
//! - `get` - Read a secret
//! - `delete` - Delete a secret
//! - `sync` - Push local changes and pull vault state

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Keeper command-line client and vault server.
#[derive(Parser)]
#[command(name = "keeper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Vault address
    #[arg(global = true, long, env = "KEEPER_SERVER", default_value = "127.0.0.1:3200")]
    server: String,

    /// Directory holding the local replica
    #[arg(global = true, long, env = "KEEPER_DATA_DIR", default_value = "keeper-data")]
    data_dir: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Account options shared by client commands.
#[derive(clap::Args)]
struct Account {
    /// Account login
    #[arg(env = "KEEPER_LOGIN")]
    login: String,

    /// Account password
    #[arg(env = "KEEPER_PASSWORD", hide_env_values = true)]
    password: String,

    /// Passphrase sealing the local replica (defaults to the password)
    #[arg(long, env = "KEEPER_REPLICA_PASSPHRASE", hide_env_values = true)]
    replica_passphrase: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the vault server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:3200")]
        bind: SocketAddr,

        /// Journal file; the vault is memory-only without one
        #[arg(short, long)]
        journal: Option<PathBuf>,

        /// Passphrase sealing the journal
        #[arg(long, env = "KEEPER_VAULT_PASSPHRASE", hide_env_values = true)]
        vault_passphrase: Option<String>,
    },

    /// Register a new account
    Auth {
        #[command(flatten)]
        account: Account,
    },

    /// Store a secret
    Add {
        #[command(flatten)]
        account: Account,

        /// Secret id
        id: String,

        /// Secret payload
        payload: String,

        /// Free-form metadata
        #[arg(default_value = "")]
        metadata: String,
    },

    /// Read a secret
    Get {
        #[command(flatten)]
        account: Account,

        /// Secret id
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete a secret
    Delete {
        #[command(flatten)]
        account: Account,

        /// Secret id
        id: String,
    },

    /// Push local changes and pull vault state
    Sync {
        #[command(flatten)]
        account: Account,

        /// Output format for pulled records (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let target = commands::Target {
        server: cli.server,
        data_dir: cli.data_dir,
    };

    match cli.command {
        Commands::Serve {
            bind,
            journal,
            vault_passphrase,
        } => {
            commands::serve::run(bind, journal, vault_passphrase.as_deref())?;
        }
        Commands::Auth { account } => {
            commands::secret::auth(&target, &account.into())?;
        }
        Commands::Add {
            account,
            id,
            payload,
            metadata,
        } => {
            commands::secret::add(&target, &account.into(), &id, &payload, &metadata)?;
        }
        Commands::Get {
            account,
            id,
            format,
        } => {
            commands::secret::get(&target, &account.into(), &id, format.parse()?)?;
        }
        Commands::Delete { account, id } => {
            commands::secret::delete(&target, &account.into(), &id)?;
        }
        Commands::Sync { account, format } => {
            commands::secret::sync(&target, &account.into(), format.parse()?)?;
        }
        Commands::Version => {
            println!("Keeper CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Keeper Core v{}", keeper_core::VERSION);
        }
    }

    Ok(())
}

impl From<Account> for commands::Credentials {
    fn from(account: Account) -> Self {
        let replica_passphrase = account
            .replica_passphrase
            .unwrap_or_else(|| account.password.clone());
        Self {
            login: account.login,
            password: account.password,
            replica_passphrase,
        }
    }
}
