//! Last-writer-wins conflict resolution.
//!
//! Both tiers use the same rule: an incoming write replaces the stored copy
//! only when its timestamp is strictly greater. Equal timestamps keep the
//! stored record, and a missing stored record behaves like negative infinity.

use crate::types::Timestamp;

/// Outcome of comparing an incoming write with the stored copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The incoming write is strictly newer; store it.
    Apply,
    /// The stored copy is newer or equal; ignore the write.
    KeepStored,
}

impl Resolution {
    /// Returns true if the incoming write should be stored.
    #[must_use]
    pub fn applies(self) -> bool {
        self == Resolution::Apply
    }
}

/// Resolves an incoming write against the stored timestamp (if any).
#[must_use]
pub fn resolve(incoming: Timestamp, stored: Option<Timestamp>) -> Resolution {
    match stored {
        Some(stored) if incoming <= stored => Resolution::KeepStored,
        _ => Resolution::Apply,
    }
}
