//! # Keeper Storage
//!
//! Append-only log backends for Keeper.
//!
//! Both tiers persist state as logs that only ever grow: the vault journals
//! accounts and sealed secrets, the client replica logs cached credentials and
//! sealed secret entries. This crate provides the byte-level half of that
//! story. Backends are **opaque byte stores**; record framing and replay live
//! in `keeper_core`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral vaults
//! - [`FileBackend`] - For persistent logs using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use keeper_storage::{InMemoryBackend, LogBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"first\n").unwrap();
//! backend.append(b"second\n").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"first\nsecond\n");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::LogBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
