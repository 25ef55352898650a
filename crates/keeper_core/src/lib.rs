//! # Keeper Core
//!
//! Shared building blocks for the Keeper vault and its offline replica.
//!
//! This crate provides:
//! - The data model ([`UserAccount`], [`SecretRecord`], [`SealedSecret`])
//! - The error taxonomy ([`KeeperError`], [`ErrorKind`])
//! - Last-writer-wins conflict resolution ([`conflict`])
//! - Authenticated encryption at rest ([`crypto`])
//! - JSON-lines record logs replayed on startup ([`RecordLog`])
//!
//! Nothing here performs network I/O; the server and client crates compose
//! these pieces into the two tiers.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod conflict;
pub mod crypto;
mod error;
mod log;
mod model;
mod types;

pub use conflict::Resolution;
pub use crypto::{hash_password, CipherCodec, EncryptionKey, KeyTier};
pub use error::{ErrorKind, KeeperError, KeeperResult};
pub use log::{CorruptLogPolicy, RecordLog, Replay};
pub use model::{SealedSecret, SecretRecord, UserAccount};
pub use types::{OwnerId, RecordKey, Timestamp};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
