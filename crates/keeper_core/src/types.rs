//! Identifier and timestamp types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Account identifier assigned by the vault on first successful Auth.
///
/// Stable forever; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u32);

impl OwnerId {
    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the Unix epoch.
///
/// Timestamps are the only ordering the system knows about: a write wins
/// when its timestamp is strictly greater than the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// Creates a timestamp from Unix milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the smallest timestamp strictly after this one.
    #[must_use]
    pub const fn successor(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns a timestamp that wins over `stored`: `self`, or the successor
    /// of `stored` when `self` would tie or lose.
    #[must_use]
    pub fn superseding(self, stored: Timestamp) -> Self {
        self.max(stored.successor())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Composite identity of a secret: unique within each tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Owning account.
    pub owner_id: OwnerId,
    /// Secret id, unique per owner.
    pub secret_id: String,
}

impl RecordKey {
    /// Creates a record key.
    pub fn new(owner_id: OwnerId, secret_id: impl Into<String>) -> Self {
        Self {
            owner_id,
            secret_id: secret_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.secret_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_order_by_millis() {
        assert!(Timestamp::from_millis(2) > Timestamp::from_millis(1));
        assert!(Timestamp::now() > Timestamp::EPOCH);
    }

    #[test]
    fn superseding_always_wins() {
        let stored = Timestamp::from_millis(100);
        assert_eq!(Timestamp::from_millis(50).superseding(stored), Timestamp::from_millis(101));
        assert_eq!(Timestamp::from_millis(100).superseding(stored), Timestamp::from_millis(101));
        assert_eq!(Timestamp::from_millis(150).superseding(stored), Timestamp::from_millis(150));
        assert_eq!(
            Timestamp::from_millis(i64::MAX).successor(),
            Timestamp::from_millis(i64::MAX)
        );
    }

    #[test]
    fn record_key_display() {
        let key = RecordKey::new(OwnerId(7), "note");
        assert_eq!(key.to_string(), "7/note");
    }

    #[test]
    fn ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&OwnerId(3)).unwrap(), "3");
        assert_eq!(
            serde_json::to_string(&Timestamp::from_millis(42)).unwrap(),
            "42"
        );
    }
}
