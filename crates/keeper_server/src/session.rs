//! Session registry.
//!
//! Maps opaque session tokens to owner ids. Sessions live only in memory:
//! they are lost on restart and never expire otherwise.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use keeper_core::{KeeperError, KeeperResult, OwnerId};
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashMap;

/// Number of random bytes in a session token.
pub const TOKEN_BYTES: usize = 32;

/// Token to owner id mapping, consulted on every authenticated call.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, OwnerId>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` for `owner_id`, replacing any previous mapping.
    pub fn add_user(&self, token: impl Into<String>, owner_id: OwnerId) {
        self.sessions.write().insert(token.into(), owner_id);
    }

    /// Resolves a token.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` if the token is unknown.
    pub fn get_user(&self, token: &str) -> KeeperResult<OwnerId> {
        self.sessions
            .read()
            .get(token)
            .copied()
            .ok_or_else(|| KeeperError::unauthenticated("unknown session token"))
    }

    /// Mints a fresh random token for `owner_id` and registers it.
    pub fn issue(&self, owner_id: OwnerId) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        self.add_user(token.clone(), owner_id);
        tracing::debug!(owner_id = %owner_id, "session issued");
        token
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
