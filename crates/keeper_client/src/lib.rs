//! # Keeper Client
//!
//! The client tier of Keeper.
//!
//! This crate provides:
//! - [`ReplicaCache`], a durable local mirror of the user's secrets sealed
//!   under a replica key
//! - [`SyncEngine`], which pushes dirty entries and pulls vault state with
//!   last-writer-wins resolution
//! - [`KeeperClient`], the gateway the CLI drives, which degrades to the
//!   replica when the vault is unreachable
//! - [`KeeperTransport`] and its CBOR-framed implementation over TCP or an
//!   in-process loopback
//!
//! # Offline behavior
//!
//! Only a transport failure counts as "vault unreachable". A call that
//! reaches the vault and is rejected is reported as is.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod engine;
mod error;
mod replica;
mod tcp;
mod transport;

pub use client::{KeeperClient, Session};
pub use config::{ClientConfig, PushScope};
pub use engine::{PullOutcome, PushOutcome, SyncEngine, SyncReport, SyncState, SyncStats};
pub use error::{ClientError, ClientResult};
pub use replica::{ReplicaCache, ReplicaEntry, ACCOUNTS_LOG, SECRETS_LOG};
pub use tcp::TcpFrameClient;
pub use transport::{FrameClient, FramedTransport, KeeperTransport, LoopbackClient, LoopbackServer};
