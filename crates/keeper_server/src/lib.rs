//! # Keeper Server
//!
//! The vault tier of Keeper.
//!
//! This crate provides:
//! - [`CredentialVault`], the authoritative store of accounts and sealed
//!   secrets, optionally journaled to disk
//! - [`SessionRegistry`], the in-memory token to owner id map
//! - [`RequestHandler`], which authorizes each call and maps errors to their
//!   wire form
//! - [`KeeperServer`], which speaks CBOR frames
//! - [`net`], a tokio TCP front end
//!
//! # Protocol
//!
//! Auth and Login return a fresh session token in the response metadata.
//! Every other call must present that token in its request metadata; the
//! handler resolves it before the vault is consulted.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
pub mod net;
mod server;
mod session;
mod vault;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::KeeperServer;
pub use session::{SessionRegistry, TOKEN_BYTES};
pub use vault::CredentialVault;
