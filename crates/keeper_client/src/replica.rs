//! The local replica.
//!
//! A durable mirror of the user's secrets that works without the vault.
//! State lives in two append-only logs under the data directory:
//!
//! - `accounts.log`: accounts seen online, for degraded-mode login
//! - `secrets.log`: sealed secret entries with their dirty flag
//!
//! Both are replayed on open; the last line for a key wins. Payloads are
//! sealed under the replica key, which is never the vault key.

use keeper_core::conflict::{self, Resolution};
use keeper_core::{
    CipherCodec, CorruptLogPolicy, KeeperResult, OwnerId, RecordKey, RecordLog, SealedSecret,
    SecretRecord, Timestamp, UserAccount,
};
use keeper_storage::{FileBackend, LogBackend};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// File name of the account log.
pub const ACCOUNTS_LOG: &str = "accounts.log";
/// File name of the secret log.
pub const SECRETS_LOG: &str = "secrets.log";

/// A cached secret and whether the vault has acknowledged it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaEntry {
    /// The sealed record.
    #[serde(flatten)]
    pub sealed: SealedSecret,
    /// True if written locally and not yet acknowledged by the vault.
    pub dirty: bool,
}

#[derive(Debug)]
struct ReplicaState {
    secrets: BTreeMap<RecordKey, ReplicaEntry>,
    accounts: HashMap<String, UserAccount>,
    secret_log: RecordLog<ReplicaEntry>,
    account_log: RecordLog<UserAccount>,
}

impl ReplicaState {
    fn append(&mut self, entry: ReplicaEntry) -> KeeperResult<()> {
        self.secret_log.append(&entry)?;
        self.secrets.insert(entry.sealed.key(), entry);
        Ok(())
    }

    fn owned_by(&self, owner_id: OwnerId) -> impl Iterator<Item = &ReplicaEntry> {
        self.secrets
            .range(RecordKey::new(owner_id, String::new())..)
            .take_while(move |(key, _)| key.owner_id == owner_id)
            .map(|(_, entry)| entry)
    }
}

/// Client-side offline-capable mirror of secrets.
///
/// One mutex guards the index and both logs, so an append and the matching
/// index update are never observed apart.
#[derive(Debug)]
pub struct ReplicaCache {
    codec: CipherCodec,
    state: Mutex<ReplicaState>,
}

impl ReplicaCache {
    /// Opens the replica stored in `dir`, creating it if needed.
    pub fn open(
        dir: &Path,
        codec: CipherCodec,
        policy: CorruptLogPolicy,
        sync_logs: bool,
    ) -> KeeperResult<Self> {
        let accounts = FileBackend::open_with_create_dirs(&dir.join(ACCOUNTS_LOG))?;
        let secrets = FileBackend::open_with_create_dirs(&dir.join(SECRETS_LOG))?;
        tracing::debug!(dir = %dir.display(), "opening replica");
        Self::with_backends(
            codec,
            Box::new(accounts),
            Box::new(secrets),
            policy,
            sync_logs,
        )
    }

    /// Opens a replica over arbitrary backends.
    pub fn with_backends(
        codec: CipherCodec,
        accounts: Box<dyn LogBackend>,
        secrets: Box<dyn LogBackend>,
        policy: CorruptLogPolicy,
        sync_logs: bool,
    ) -> KeeperResult<Self> {
        let mut account_log = RecordLog::<UserAccount>::new(ACCOUNTS_LOG, accounts)
            .with_sync_on_append(sync_logs);
        let mut secret_log =
            RecordLog::<ReplicaEntry>::new(SECRETS_LOG, secrets).with_sync_on_append(sync_logs);

        let account_replay = account_log.replay(policy)?;
        let secret_replay = secret_log.replay(policy)?;

        let accounts: HashMap<_, _> = account_replay
            .records
            .into_iter()
            .map(|a| (a.login.clone(), a))
            .collect();
        let secrets: BTreeMap<_, _> = secret_replay
            .records
            .into_iter()
            .map(|e| (e.sealed.key(), e))
            .collect();

        let skipped = account_replay.skipped + secret_replay.skipped;
        if skipped > 0 {
            tracing::warn!(skipped, "replica opened with corrupt lines skipped");
        }
        tracing::debug!(
            accounts = accounts.len(),
            secrets = secrets.len(),
            "replica loaded"
        );

        Ok(Self {
            codec,
            state: Mutex::new(ReplicaState {
                secrets,
                accounts,
                secret_log,
                account_log,
            }),
        })
    }

    /// Returns the replica codec.
    pub fn codec(&self) -> &CipherCodec {
        &self.codec
    }

    /// Appends an entry and makes it current.
    pub fn put(&self, entry: ReplicaEntry) -> KeeperResult<()> {
        self.state.lock().append(entry)
    }

    /// Seals `record` under the replica key and stores it.
    pub fn store(&self, record: &SecretRecord, dirty: bool) -> KeeperResult<()> {
        let sealed = record.seal(&self.codec)?;
        self.put(ReplicaEntry { sealed, dirty })
    }

    /// Stores `record` only if it is strictly newer than the local copy.
    ///
    /// Returns whether it was stored.
    pub fn store_if_newer(&self, record: &SecretRecord, dirty: bool) -> KeeperResult<bool> {
        let mut state = self.state.lock();
        let local = state
            .secrets
            .get(&record.key())
            .map(|e| e.sealed.last_changed);

        match conflict::resolve(record.last_changed, local) {
            Resolution::Apply => {
                let sealed = record.seal(&self.codec)?;
                state.append(ReplicaEntry { sealed, dirty })?;
                Ok(true)
            }
            Resolution::KeepStored => Ok(false),
        }
    }

    /// Returns the current entry for a key, tombstones included.
    pub fn entry(&self, owner_id: OwnerId, secret_id: &str) -> Option<ReplicaEntry> {
        self.state
            .lock()
            .secrets
            .get(&RecordKey::new(owner_id, secret_id))
            .cloned()
    }

    /// Returns the decrypted record for a key, tombstones included.
    pub fn get(&self, owner_id: OwnerId, secret_id: &str) -> KeeperResult<Option<SecretRecord>> {
        self.entry(owner_id, secret_id)
            .map(|e| e.sealed.open(&self.codec))
            .transpose()
    }

    /// Tombstones a local entry and marks it dirty. Never calls the vault.
    ///
    /// The tombstone is stamped `at`, or just after the entry's current
    /// `last_changed` when `at` would not win over it, so the delete
    /// supersedes every copy of the record. Returns the stamp applied, or
    /// `None` when the key is unknown.
    pub fn mark_deleted(
        &self,
        owner_id: OwnerId,
        secret_id: &str,
        at: Timestamp,
    ) -> KeeperResult<Option<Timestamp>> {
        let mut state = self.state.lock();
        let Some(current) = state.secrets.get(&RecordKey::new(owner_id, secret_id)) else {
            return Ok(None);
        };

        let mut entry = current.clone();
        let stamp = at.superseding(entry.sealed.last_changed);
        entry.sealed.tombstone(Some(stamp));
        entry.dirty = true;
        state.append(entry)?;
        Ok(Some(stamp))
    }

    /// Returns every entry of `owner_id`, ordered by secret id.
    pub fn entries_for(&self, owner_id: OwnerId) -> Vec<ReplicaEntry> {
        self.state.lock().owned_by(owner_id).cloned().collect()
    }

    /// Returns the dirty entries of `owner_id`, ordered by secret id.
    pub fn dirty_entries_for(&self, owner_id: OwnerId) -> Vec<ReplicaEntry> {
        self.state
            .lock()
            .owned_by(owner_id)
            .filter(|e| e.dirty)
            .cloned()
            .collect()
    }

    /// Marks pushed entries clean.
    ///
    /// Each pair names a secret and the `last_changed` that was pushed. An
    /// entry rewritten since then keeps its dirty flag. Returns the number
    /// of entries cleaned.
    pub fn mark_clean(&self, owner_id: OwnerId, pushed: &[(String, Timestamp)]) -> KeeperResult<usize> {
        let mut state = self.state.lock();
        let mut cleaned = 0;

        for (secret_id, pushed_at) in pushed {
            let key = RecordKey::new(owner_id, secret_id.clone());
            let Some(current) = state.secrets.get(&key) else {
                continue;
            };
            if !current.dirty || current.sealed.last_changed != *pushed_at {
                continue;
            }

            let mut entry = current.clone();
            entry.dirty = false;
            state.append(entry)?;
            cleaned += 1;
        }
        Ok(cleaned)
    }

    /// Marks clean entries dirty again so the next push resends them.
    ///
    /// Used when the vault no longer holds records it had acknowledged.
    /// Returns the number of entries marked.
    pub fn mark_dirty(&self, owner_id: OwnerId, secret_ids: &[String]) -> KeeperResult<usize> {
        let mut state = self.state.lock();
        let mut marked = 0;

        for secret_id in secret_ids {
            let key = RecordKey::new(owner_id, secret_id.clone());
            let Some(current) = state.secrets.get(&key) else {
                continue;
            };
            if current.dirty {
                continue;
            }

            let mut entry = current.clone();
            entry.dirty = true;
            state.append(entry)?;
            marked += 1;
        }
        Ok(marked)
    }

    /// Remembers an account for offline login.
    pub fn cache_account(&self, account: &UserAccount) -> KeeperResult<()> {
        let mut state = self.state.lock();
        if state.accounts.get(&account.login) == Some(account) {
            return Ok(());
        }
        state.account_log.append(account)?;
        state
            .accounts
            .insert(account.login.clone(), account.clone());
        Ok(())
    }

    /// Returns the cached account for `login`.
    pub fn account(&self, login: &str) -> Option<UserAccount> {
        self.state.lock().accounts.get(login).cloned()
    }

    /// Returns the number of cached secrets, tombstones included.
    pub fn len(&self) -> usize {
        self.state.lock().secrets.len()
    }

    /// Returns true if no secret is cached.
    pub fn is_empty(&self) -> bool {
        self.state.lock().secrets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::{EncryptionKey, ErrorKind};
    use keeper_storage::InMemoryBackend;

    struct Fixture {
        key: EncryptionKey,
        accounts: InMemoryBackend,
        secrets: InMemoryBackend,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                key: EncryptionKey::generate(),
                accounts: InMemoryBackend::new(),
                secrets: InMemoryBackend::new(),
            }
        }

        fn open(&self, policy: CorruptLogPolicy) -> KeeperResult<ReplicaCache> {
            ReplicaCache::with_backends(
                CipherCodec::new(self.key.clone()),
                Box::new(self.accounts.clone()),
                Box::new(self.secrets.clone()),
                policy,
                false,
            )
        }
    }

    fn at(millis: i64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    fn record(id: &str, payload: &str, millis: i64) -> SecretRecord {
        SecretRecord::new(OwnerId(1), id, payload, "meta", at(millis))
    }

    #[test]
    fn store_and_get() {
        let fixture = Fixture::new();
        let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
        replica.store(&record("note1", "hunter2", 100), true).unwrap();

        let got = replica.get(OwnerId(1), "note1").unwrap().unwrap();
        assert_eq!(got.payload, "hunter2");
        assert!(replica.entry(OwnerId(1), "note1").unwrap().dirty);
        assert!(replica.get(OwnerId(2), "note1").unwrap().is_none());
    }

    #[test]
    fn log_holds_no_plaintext() {
        let fixture = Fixture::new();
        let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
        replica.store(&record("note1", "hunter2", 100), true).unwrap();

        let log = String::from_utf8(fixture.secrets.data()).unwrap();
        assert!(log.contains("note1"));
        assert!(!log.contains("hunter2"));
    }

    #[test]
    fn reopen_replays_last_entry_per_key() {
        let fixture = Fixture::new();
        {
            let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
            replica.store(&record("note1", "v1", 100), true).unwrap();
            replica.store(&record("note1", "v2", 200), true).unwrap();
            replica.mark_clean(OwnerId(1), &[("note1".into(), at(200))]).unwrap();
        }

        let replica = fixture.open(CorruptLogPolicy::Fail).unwrap();
        assert_eq!(replica.len(), 1);
        let entry = replica.entry(OwnerId(1), "note1").unwrap();
        assert!(!entry.dirty);
        assert_eq!(entry.sealed.last_changed, at(200));
        assert_eq!(replica.get(OwnerId(1), "note1").unwrap().unwrap().payload, "v2");
    }

    #[test]
    fn store_if_newer_respects_timestamps() {
        let fixture = Fixture::new();
        let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();

        assert!(replica.store_if_newer(&record("n", "v2", 200), false).unwrap());
        assert!(!replica.store_if_newer(&record("n", "tie", 200), false).unwrap());
        assert!(!replica.store_if_newer(&record("n", "v1", 100), false).unwrap());
        assert_eq!(replica.get(OwnerId(1), "n").unwrap().unwrap().payload, "v2");
    }

    #[test]
    fn mark_deleted_is_local_and_dirty() {
        let fixture = Fixture::new();
        let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
        replica.store(&record("n", "v1", 100), false).unwrap();

        assert_eq!(
            replica.mark_deleted(OwnerId(1), "n", at(150)).unwrap(),
            Some(at(150))
        );
        let entry = replica.entry(OwnerId(1), "n").unwrap();
        assert!(entry.sealed.deleted);
        assert!(entry.dirty);
        assert_eq!(entry.sealed.last_changed, at(150));

        assert_eq!(replica.mark_deleted(OwnerId(1), "ghost", at(150)).unwrap(), None);
    }

    #[test]
    fn delete_stamp_supersedes_same_or_future_write() {
        let fixture = Fixture::new();
        let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
        replica.store(&record("same", "v", 100), false).unwrap();
        replica.store(&record("ahead", "v", 5_000), false).unwrap();

        let stamp = replica.mark_deleted(OwnerId(1), "same", at(100)).unwrap();
        assert_eq!(stamp, Some(at(101)));

        let stamp = replica.mark_deleted(OwnerId(1), "ahead", at(100)).unwrap();
        assert_eq!(stamp, Some(at(5_001)));
        assert_eq!(replica.entry(OwnerId(1), "ahead").unwrap().sealed.last_changed, at(5_001));
    }

    #[test]
    fn mark_dirty_requeues_clean_entries() {
        let fixture = Fixture::new();
        let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
        replica.store(&record("a", "v", 100), false).unwrap();
        replica.store(&record("b", "v", 100), true).unwrap();

        let marked = replica
            .mark_dirty(OwnerId(1), &["a".into(), "b".into(), "ghost".into()])
            .unwrap();
        assert_eq!(marked, 1);
        assert_eq!(replica.dirty_entries_for(OwnerId(1)).len(), 2);
    }

    #[test]
    fn mark_clean_skips_rewritten_entries() {
        let fixture = Fixture::new();
        let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
        replica.store(&record("a", "v1", 100), true).unwrap();
        replica.store(&record("b", "v1", 100), true).unwrap();
        replica.store(&record("b", "v2", 300), true).unwrap();

        let cleaned = replica
            .mark_clean(OwnerId(1), &[("a".into(), at(100)), ("b".into(), at(100))])
            .unwrap();
        assert_eq!(cleaned, 1);

        let dirty: Vec<_> = replica
            .dirty_entries_for(OwnerId(1))
            .into_iter()
            .map(|e| e.sealed.secret_id)
            .collect();
        assert_eq!(dirty, vec!["b"]);
        assert_eq!(replica.entries_for(OwnerId(1)).len(), 2);
    }

    #[test]
    fn accounts_are_cached_once() {
        let fixture = Fixture::new();
        let account = UserAccount {
            owner_id: OwnerId(1),
            login: "alice".into(),
            password_hash: "hash".into(),
        };
        {
            let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
            replica.cache_account(&account).unwrap();
            replica.cache_account(&account).unwrap();
        }
        assert_eq!(fixture.accounts.data().iter().filter(|b| **b == b'\n').count(), 1);

        let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
        assert_eq!(replica.account("alice"), Some(account));
        assert_eq!(replica.account("bob"), None);
    }

    #[test]
    fn corrupt_lines_follow_policy() {
        let fixture = Fixture::new();
        {
            let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
            replica.store(&record("a", "v1", 100), true).unwrap();
        }
        let mut secrets = fixture.secrets.clone();
        secrets.append(b"{garbage\n").unwrap();

        let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
        assert_eq!(replica.len(), 1);

        let err = fixture.open(CorruptLogPolicy::Fail).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalPersistenceFailure);
    }

    #[test]
    fn failed_append_leaves_index_unchanged() {
        let fixture = Fixture::new();
        let replica = fixture.open(CorruptLogPolicy::Skip).unwrap();
        fixture.secrets.set_read_only(true);

        let err = replica.store(&record("a", "v1", 100), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalPersistenceFailure);
        assert!(replica.is_empty());
    }

    #[test]
    fn file_replica_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = EncryptionKey::generate();
        {
            let replica = ReplicaCache::open(
                dir.path(),
                CipherCodec::new(key.clone()),
                CorruptLogPolicy::Fail,
                true,
            )
            .unwrap();
            replica.store(&record("a", "v1", 100), true).unwrap();
        }
        assert!(dir.path().join(SECRETS_LOG).exists());
        assert!(dir.path().join(ACCOUNTS_LOG).exists());

        let replica =
            ReplicaCache::open(dir.path(), CipherCodec::new(key), CorruptLogPolicy::Fail, true)
                .unwrap();
        assert_eq!(replica.get(OwnerId(1), "a").unwrap().unwrap().payload, "v1");
    }
}
