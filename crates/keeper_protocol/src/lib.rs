//! # Keeper Protocol
//!
//! Wire messages and framing for Keeper.
//!
//! This crate provides:
//! - [`RequestFrame`] and [`ResponseFrame`], the only things that cross the wire
//! - [`RemoteCall`], one variant per remote operation
//! - [`CallMetadata`], the out-of-band channel that carries the session token
//! - CBOR encoding and `u32` big-endian length-prefixed framing
//!
//! This is a pure protocol crate with no network I/O of its own; the framing
//! helpers work over any `Read`/`Write`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod frame;
mod messages;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{read_frame, write_frame, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
pub use messages::{
    AddDataRequest, CallMetadata, ClientSyncReport, ClientSyncRequest, Credentials, DataRecord,
    DelDataRequest, FailedRecord, GetDataRequest, RemoteCall, RemoteError, Reply, RequestFrame,
    ResponseFrame,
};
