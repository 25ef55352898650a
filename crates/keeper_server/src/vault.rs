//! The credential vault.
//!
//! Authoritative store of accounts and secret records. Records are sealed
//! under the vault key before they reach the tables or the journal, and
//! opened again only on the way out.
//!
//! # Conflict resolution
//!
//! Every write goes through [`keeper_core::conflict::resolve`]: it is applied
//! only when its timestamp is strictly greater than the stored one. The
//! table write lock is held across the comparison, the journal append and
//! the table update, so concurrent writers to one key cannot interleave.

use keeper_core::conflict::{self, Resolution};
use keeper_core::{
    CipherCodec, CorruptLogPolicy, KeeperError, KeeperResult, OwnerId, RecordKey, RecordLog,
    SealedSecret, SecretRecord, Timestamp, UserAccount,
};
use keeper_protocol::{ClientSyncReport, FailedRecord};
use keeper_storage::LogBackend;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One line of the vault journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JournalEntry {
    Account(UserAccount),
    Secret(SealedSecret),
}

#[derive(Debug)]
struct VaultTables {
    users: HashMap<String, UserAccount>,
    secrets: BTreeMap<RecordKey, SealedSecret>,
    next_owner: u32,
    journal: Option<RecordLog<JournalEntry>>,
}

impl VaultTables {
    fn empty(journal: Option<RecordLog<JournalEntry>>) -> Self {
        Self {
            users: HashMap::new(),
            secrets: BTreeMap::new(),
            next_owner: 1,
            journal,
        }
    }

    fn apply(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Account(account) => {
                self.next_owner = self.next_owner.max(account.owner_id.get().saturating_add(1));
                self.users.insert(account.login.clone(), account);
            }
            JournalEntry::Secret(sealed) => {
                self.secrets.insert(sealed.key(), sealed);
            }
        }
    }

    fn record(&mut self, entry: JournalEntry) -> KeeperResult<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&entry)?;
        }
        self.apply(entry);
        Ok(())
    }

    fn owned_by(&self, owner_id: OwnerId) -> impl Iterator<Item = &SealedSecret> {
        self.secrets
            .range(RecordKey::new(owner_id, String::new())..)
            .take_while(move |(key, _)| key.owner_id == owner_id)
            .map(|(_, sealed)| sealed)
    }
}

/// Server-side store of accounts and secrets.
#[derive(Debug)]
pub struct CredentialVault {
    codec: CipherCodec,
    tables: RwLock<VaultTables>,
}

impl CredentialVault {
    /// Creates a memory-only vault.
    pub fn in_memory(codec: CipherCodec) -> Self {
        Self {
            codec,
            tables: RwLock::new(VaultTables::empty(None)),
        }
    }

    /// Opens a journaled vault, replaying `backend` first.
    ///
    /// # Errors
    ///
    /// A journal line that does not parse aborts the open with
    /// `LocalPersistenceFailure`.
    pub fn open(codec: CipherCodec, backend: Box<dyn LogBackend>) -> KeeperResult<Self> {
        Self::open_with_options(codec, backend, true)
    }

    /// Opens a journaled vault, choosing whether appends are synced.
    pub fn open_with_options(
        codec: CipherCodec,
        backend: Box<dyn LogBackend>,
        sync_on_append: bool,
    ) -> KeeperResult<Self> {
        let mut journal =
            RecordLog::new("vault journal", backend).with_sync_on_append(sync_on_append);
        let replay = journal.replay(CorruptLogPolicy::Fail)?;

        let mut tables = VaultTables::empty(None);
        for entry in replay.records {
            tables.apply(entry);
        }
        tables.journal = Some(journal);

        tracing::info!(
            accounts = tables.users.len(),
            secrets = tables.secrets.len(),
            "vault journal replayed"
        );

        Ok(Self {
            codec,
            tables: RwLock::new(tables),
        })
    }

    /// Registers a new account and returns its owner id.
    ///
    /// # Errors
    ///
    /// `DuplicateLogin` if the login exists, `InvalidArgument` for empty
    /// fields.
    pub fn auth(&self, login: &str, password_hash: &str) -> KeeperResult<OwnerId> {
        UserAccount::validate_credentials(login, password_hash)?;

        let mut tables = self.tables.write();
        if tables.users.contains_key(login) {
            return Err(KeeperError::duplicate_login(login));
        }

        let owner_id = OwnerId(tables.next_owner);
        tables.record(JournalEntry::Account(UserAccount {
            owner_id,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
        }))?;

        tracing::info!(owner_id = %owner_id, "account created");
        Ok(owner_id)
    }

    /// Checks credentials and returns the owner id.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown login, `WrongPassword` on hash mismatch.
    pub fn login(&self, login: &str, password_hash: &str) -> KeeperResult<OwnerId> {
        UserAccount::validate_credentials(login, password_hash)?;

        let tables = self.tables.read();
        let account = tables
            .users
            .get(login)
            .ok_or_else(|| KeeperError::not_found(format!("login {login}")))?;

        if !keeper_core::crypto::verify_password_hash(&account.password_hash, password_hash) {
            return Err(KeeperError::WrongPassword);
        }
        Ok(account.owner_id)
    }

    /// Upserts a record under the last-writer-wins rule.
    ///
    /// Returns `true` if the record was stored, `false` if the stored copy
    /// is newer or equal.
    pub fn add_data(&self, record: &SecretRecord) -> KeeperResult<bool> {
        SecretRecord::validate_id(&record.secret_id)?;
        let sealed = record.seal(&self.codec)?;

        let mut tables = self.tables.write();
        let stored = tables.secrets.get(&sealed.key()).map(|s| s.last_changed);

        match conflict::resolve(sealed.last_changed, stored) {
            Resolution::Apply => {
                tables.record(JournalEntry::Secret(sealed))?;
                tracing::debug!(key = %record.key(), at = %record.last_changed, "record applied");
                Ok(true)
            }
            Resolution::KeepStored => {
                tracing::debug!(key = %record.key(), at = %record.last_changed, "stale write ignored");
                Ok(false)
            }
        }
    }

    /// Returns the live record for `(owner_id, secret_id)`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record is absent, tombstoned or owned by someone
    /// else.
    pub fn get_data(&self, owner_id: OwnerId, secret_id: &str) -> KeeperResult<SecretRecord> {
        SecretRecord::validate_id(secret_id)?;

        let key = RecordKey::new(owner_id, secret_id);
        let sealed = {
            let tables = self.tables.read();
            match tables.secrets.get(&key) {
                Some(sealed) if !sealed.deleted => sealed.clone(),
                _ => return Err(KeeperError::not_found(format!("secret {secret_id}"))),
            }
        };
        sealed.open(&self.codec)
    }

    /// Tombstones a record in place, keeping its ciphertext.
    ///
    /// `last_changed` only advances when `deleted_at` is strictly newer.
    /// Deleting an unknown key succeeds without effect.
    pub fn del_data(
        &self,
        owner_id: OwnerId,
        secret_id: &str,
        deleted_at: Option<Timestamp>,
    ) -> KeeperResult<()> {
        SecretRecord::validate_id(secret_id)?;

        let key = RecordKey::new(owner_id, secret_id);
        let mut tables = self.tables.write();
        let Some(current) = tables.secrets.get(&key) else {
            tracing::debug!(key = %key, "delete of unknown record ignored");
            return Ok(());
        };

        let mut tombstone = current.clone();
        let was_deleted = tombstone.deleted;
        let advanced = tombstone.tombstone(deleted_at);
        if was_deleted && !advanced {
            return Ok(());
        }

        tables.record(JournalEntry::Secret(tombstone))?;
        tracing::debug!(key = %key, "record tombstoned");
        Ok(())
    }

    /// Returns every record of `owner_id`, tombstones included, ordered by
    /// secret id.
    pub fn sync(&self, owner_id: OwnerId) -> KeeperResult<Vec<SecretRecord>> {
        let sealed: Vec<SealedSecret> = self.tables.read().owned_by(owner_id).cloned().collect();
        sealed.iter().map(|s| s.open(&self.codec)).collect()
    }

    /// Upserts a batch, one record at a time.
    ///
    /// Each record is resolved independently. A record that fails is listed
    /// in the report and does not stop the rest of the batch. Every record is
    /// stored under `owner_id` regardless of what it carries.
    pub fn client_sync(&self, owner_id: OwnerId, records: Vec<SecretRecord>) -> ClientSyncReport {
        let mut report = ClientSyncReport::default();

        for mut record in records {
            record.owner_id = owner_id;
            match self.add_data(&record) {
                Ok(true) => report.applied += 1,
                Ok(false) => report.stale += 1,
                Err(err) => {
                    tracing::warn!(key = %record.key(), error = %err, "client sync record failed");
                    report.failed.push(FailedRecord {
                        secret_id: record.secret_id,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            owner_id = %owner_id,
            applied = report.applied,
            stale = report.stale,
            failed = report.failed.len(),
            "client sync batch processed"
        );
        report
    }

    /// Returns the number of registered accounts.
    pub fn account_count(&self) -> usize {
        self.tables.read().users.len()
    }

    /// Returns the number of stored records, tombstones included.
    pub fn record_count(&self) -> usize {
        self.tables.read().secrets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::{hash_password, EncryptionKey, ErrorKind};
    use keeper_storage::InMemoryBackend;

    fn vault() -> CredentialVault {
        CredentialVault::in_memory(CipherCodec::new(EncryptionKey::generate()))
    }

    fn at(millis: i64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    fn secret(owner: u32, id: &str, payload: &str, millis: i64) -> SecretRecord {
        SecretRecord::new(OwnerId(owner), id, payload, "meta", at(millis))
    }

    #[test]
    fn auth_assigns_sequential_ids() {
        let vault = vault();
        assert_eq!(vault.auth("alice", &hash_password("pw1")).unwrap(), OwnerId(1));
        assert_eq!(vault.auth("bob", &hash_password("pw2")).unwrap(), OwnerId(2));

        let err = vault.auth("alice", &hash_password("pw3")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateLogin);
        assert_eq!(vault.account_count(), 2);
    }

    #[test]
    fn login_checks_hash() {
        let vault = vault();
        vault.auth("alice", &hash_password("pw1")).unwrap();

        assert_eq!(vault.login("alice", &hash_password("pw1")).unwrap(), OwnerId(1));
        assert_eq!(
            vault.login("alice", &hash_password("pw2")).unwrap_err().kind(),
            ErrorKind::WrongPassword
        );
        assert_eq!(
            vault.login("carol", &hash_password("pw1")).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn empty_fields_are_invalid() {
        let vault = vault();
        assert_eq!(
            vault.auth("", "hash").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            vault.add_data(&secret(1, "", "x", 1)).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn add_then_get() {
        let vault = vault();
        assert!(vault.add_data(&secret(1, "note1", "hunter2", 100)).unwrap());

        let record = vault.get_data(OwnerId(1), "note1").unwrap();
        assert_eq!(record.payload, "hunter2");
        assert_eq!(record.metadata, "meta");
        assert_eq!(record.last_changed, at(100));
    }

    #[test]
    fn stale_and_equal_writes_are_ignored() {
        let vault = vault();
        vault.add_data(&secret(1, "note1", "v2", 200)).unwrap();

        assert!(!vault.add_data(&secret(1, "note1", "v1", 100)).unwrap());
        assert!(!vault.add_data(&secret(1, "note1", "tie", 200)).unwrap());
        assert_eq!(vault.get_data(OwnerId(1), "note1").unwrap().payload, "v2");

        assert!(vault.add_data(&secret(1, "note1", "v3", 300)).unwrap());
        assert_eq!(vault.get_data(OwnerId(1), "note1").unwrap().payload, "v3");
    }

    #[test]
    fn records_are_isolated_per_owner() {
        let vault = vault();
        vault.add_data(&secret(1, "note1", "alice", 100)).unwrap();

        assert_eq!(
            vault.get_data(OwnerId(2), "note1").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(vault.sync(OwnerId(2)).unwrap().is_empty());
    }

    #[test]
    fn delete_hides_record_but_sync_keeps_tombstone() {
        let vault = vault();
        vault.add_data(&secret(1, "note1", "hunter2", 100)).unwrap();
        vault.del_data(OwnerId(1), "note1", None).unwrap();

        assert_eq!(
            vault.get_data(OwnerId(1), "note1").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        let records = vault.sync(OwnerId(1)).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].deleted);
        assert_eq!(records[0].payload, "hunter2");
        assert_eq!(records[0].last_changed, at(100));
    }

    #[test]
    fn delete_advances_timestamp_only_forward() {
        let vault = vault();
        vault.add_data(&secret(1, "note1", "x", 100)).unwrap();

        vault.del_data(OwnerId(1), "note1", Some(at(50))).unwrap();
        assert_eq!(vault.sync(OwnerId(1)).unwrap()[0].last_changed, at(100));

        vault.del_data(OwnerId(1), "note1", Some(at(150))).unwrap();
        assert_eq!(vault.sync(OwnerId(1)).unwrap()[0].last_changed, at(150));
    }

    #[test]
    fn newer_write_resurrects_tombstone() {
        let vault = vault();
        vault.add_data(&secret(1, "note1", "x", 100)).unwrap();
        vault.del_data(OwnerId(1), "note1", Some(at(200))).unwrap();

        assert!(!vault.add_data(&secret(1, "note1", "old", 150)).unwrap());
        assert!(vault.add_data(&secret(1, "note1", "new", 250)).unwrap());
        assert_eq!(vault.get_data(OwnerId(1), "note1").unwrap().payload, "new");
    }

    #[test]
    fn delete_unknown_is_noop() {
        let vault = vault();
        vault.del_data(OwnerId(1), "ghost", None).unwrap();
        assert_eq!(vault.record_count(), 0);
    }

    #[test]
    fn sync_orders_by_secret_id() {
        let vault = vault();
        for id in ["c", "a", "b"] {
            vault.add_data(&secret(1, id, id, 1)).unwrap();
        }
        vault.add_data(&secret(2, "0", "other", 1)).unwrap();

        let ids: Vec<_> = vault
            .sync(OwnerId(1))
            .unwrap()
            .into_iter()
            .map(|r| r.secret_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn client_sync_reports_per_record() {
        let vault = vault();
        vault.add_data(&secret(1, "kept", "server", 500)).unwrap();

        let report = vault.client_sync(
            OwnerId(1),
            vec![
                secret(1, "new", "client", 100),
                secret(1, "kept", "client", 400),
                secret(1, "", "broken", 100),
                secret(9, "stolen", "client", 100),
            ],
        );

        assert_eq!(report.applied, 2);
        assert_eq!(report.stale, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].kind, ErrorKind::InvalidArgument);

        assert_eq!(vault.get_data(OwnerId(1), "kept").unwrap().payload, "server");
        assert_eq!(vault.get_data(OwnerId(1), "stolen").unwrap().payload, "client");
        assert!(vault.get_data(OwnerId(9), "stolen").is_err());
    }

    #[test]
    fn journal_replays_accounts_and_secrets() {
        let key = EncryptionKey::generate();
        let backend = InMemoryBackend::new();

        {
            let vault =
                CredentialVault::open(CipherCodec::new(key.clone()), Box::new(backend.clone()))
                    .unwrap();
            vault.auth("alice", &hash_password("pw1")).unwrap();
            vault.add_data(&secret(1, "note1", "hunter2", 100)).unwrap();
            vault.del_data(OwnerId(1), "note1", Some(at(200))).unwrap();
        }

        let journal = String::from_utf8(backend.data()).unwrap();
        assert!(!journal.contains("hunter2"));

        let vault = CredentialVault::open(CipherCodec::new(key), Box::new(backend)).unwrap();
        assert_eq!(vault.login("alice", &hash_password("pw1")).unwrap(), OwnerId(1));
        assert_eq!(vault.auth("bob", &hash_password("pw2")).unwrap(), OwnerId(2));

        let records = vault.sync(OwnerId(1)).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].deleted);
        assert_eq!(records[0].last_changed, at(200));
    }

    #[test]
    fn corrupt_journal_is_fatal() {
        let backend = InMemoryBackend::with_data(b"{\"type\":\"account\"\n".to_vec());
        let err = CredentialVault::open(
            CipherCodec::new(EncryptionKey::generate()),
            Box::new(backend),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalPersistenceFailure);
    }

    #[test]
    fn failed_journal_append_leaves_tables_unchanged() {
        let backend = InMemoryBackend::new();
        let vault = CredentialVault::open(
            CipherCodec::new(EncryptionKey::generate()),
            Box::new(backend.clone()),
        )
        .unwrap();
        backend.set_read_only(true);

        let err = vault.add_data(&secret(1, "note1", "x", 100)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalPersistenceFailure);
        assert_eq!(vault.record_count(), 0);
    }
}
