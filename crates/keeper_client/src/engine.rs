//! Sync engine.
//!
//! Reconciles the replica with the vault, last-writer-wins per record.
//!
//! ## Cycle
//!
//! 1. **Push**: decrypt the owner's entries under the replica key and send
//!    them in one ClientSync call. Entries the vault applied or found stale
//!    become clean; failed entries stay dirty.
//! 2. **Pull**: fetch every record of the owner and store the ones strictly
//!    newer than the local copy, resealed under the replica key and clean.
//!
//! Both halves are idempotent when the other side has not changed. There is
//! no retry or backoff: a transport failure ends the cycle and the caller
//! carries on with local state.

use crate::config::PushScope;
use crate::error::{ClientError, ClientResult};
use crate::replica::{ReplicaCache, ReplicaEntry};
use crate::transport::KeeperTransport;
use keeper_core::{KeeperError, OwnerId, SecretRecord, Timestamp};
use keeper_protocol::{ClientSyncReport, DataRecord};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is pushing local changes to the vault.
    Pushing,
    /// Engine is pulling vault changes into the replica.
    Pulling,
    /// Engine has completed a sync cycle.
    Synced,
    /// The last cycle failed.
    Error,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Pushing | SyncState::Pulling)
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Cumulative statistics.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Number of completed cycles.
    pub cycles_completed: u64,
    /// Records stored by pulls.
    pub records_pulled: u64,
    /// Records sent by pushes.
    pub records_pushed: u64,
    /// Time of the last completed cycle.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a pull.
#[derive(Debug, Clone, Default)]
pub struct PullOutcome {
    /// Records that were strictly newer than the local copy.
    pub changed: Vec<SecretRecord>,
    /// Records that were older than or equal to the local copy.
    pub unchanged: usize,
    /// Clean local entries the vault no longer holds, queued for the next
    /// push.
    pub requeued: usize,
}

/// Result of a push.
#[derive(Debug, Clone, Default)]
pub struct PushOutcome {
    /// Records sent.
    pub pushed: usize,
    /// Entries that could not be opened under the replica key and were
    /// left out.
    pub unreadable: usize,
    /// The vault's per-record report.
    pub report: ClientSyncReport,
}

/// Result of a full cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Push half.
    pub push: PushOutcome,
    /// Pull half.
    pub pull: PullOutcome,
    /// Duration of the cycle.
    pub duration: Duration,
}

/// Moves records between a replica and the vault.
pub struct SyncEngine<T: KeeperTransport> {
    transport: Arc<T>,
    replica: Arc<ReplicaCache>,
    push_scope: PushScope,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<T: KeeperTransport> SyncEngine<T> {
    /// Creates an engine over a shared transport and replica.
    pub fn new(transport: Arc<T>, replica: Arc<ReplicaCache>, push_scope: PushScope) -> Self {
        Self {
            transport,
            replica,
            push_scope,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the push scope.
    pub fn push_scope(&self) -> PushScope {
        self.push_scope
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Moves into `phase` unless a cycle is already running.
    fn begin(&self, phase: SyncState) -> ClientResult<()> {
        let mut state = self.state.write();
        if !state.can_start_sync() {
            return Err(ClientError::Local(KeeperError::internal(
                "sync already in progress",
            )));
        }
        *state = phase;
        Ok(())
    }

    fn fail(&self, err: ClientError) -> ClientError {
        self.handle_error(&err);
        err
    }

    fn handle_error(&self, err: &ClientError) {
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(err.to_string());
        if err.is_unreachable() {
            tracing::warn!(error = %err, "sync interrupted, vault unreachable");
        } else {
            tracing::error!(error = %err, "sync failed");
        }
    }

    /// Runs push then pull for `owner_id`.
    pub fn sync(&self, owner_id: OwnerId, token: &str) -> ClientResult<SyncReport> {
        let start = Instant::now();
        self.begin(SyncState::Pushing)?;
        let push = self.push_inner(owner_id, token).map_err(|e| self.fail(e))?;

        self.set_state(SyncState::Pulling);
        let pull = self.pull_inner(owner_id, token).map_err(|e| self.fail(e))?;

        self.set_state(SyncState::Synced);
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }

        let report = SyncReport {
            push,
            pull,
            duration: start.elapsed(),
        };
        tracing::info!(
            owner_id = %owner_id,
            pushed = report.push.pushed,
            pulled = report.pull.changed.len(),
            requeued = report.pull.requeued,
            failed = report.push.report.failed.len(),
            "sync complete"
        );
        Ok(report)
    }

    /// Pulls vault state into the replica.
    pub fn pull(&self, owner_id: OwnerId, token: &str) -> ClientResult<PullOutcome> {
        self.begin(SyncState::Pulling)?;
        let outcome = self.pull_inner(owner_id, token).map_err(|e| self.fail(e))?;
        self.set_state(SyncState::Idle);
        Ok(outcome)
    }

    /// Pushes replica state into the vault.
    pub fn push(&self, owner_id: OwnerId, token: &str) -> ClientResult<PushOutcome> {
        self.begin(SyncState::Pushing)?;
        let outcome = self.push_inner(owner_id, token).map_err(|e| self.fail(e))?;
        self.set_state(SyncState::Idle);
        Ok(outcome)
    }

    fn pull_inner(&self, owner_id: OwnerId, token: &str) -> ClientResult<PullOutcome> {
        let remote = self.transport.sync(token)?;
        let mut outcome = PullOutcome::default();
        let held: HashSet<String> = remote.iter().map(|d| d.secret_id.clone()).collect();

        for data in remote {
            let record = data.into_record(owner_id);
            if self.replica.store_if_newer(&record, false)? {
                tracing::debug!(key = %record.key(), at = %record.last_changed, "pulled newer record");
                outcome.changed.push(record);
            } else {
                outcome.unchanged += 1;
            }
        }

        // Clean entries the vault no longer holds go back on the push queue.
        let missing: Vec<String> = self
            .replica
            .entries_for(owner_id)
            .into_iter()
            .filter(|e| !e.dirty && !held.contains(&e.sealed.secret_id))
            .map(|e| e.sealed.secret_id)
            .collect();
        if !missing.is_empty() {
            outcome.requeued = self.replica.mark_dirty(owner_id, &missing)?;
            tracing::warn!(
                owner_id = %owner_id,
                requeued = outcome.requeued,
                "vault is missing acknowledged records, queued for push"
            );
        }

        self.stats.write().records_pulled += outcome.changed.len() as u64;
        Ok(outcome)
    }

    fn push_inner(&self, owner_id: OwnerId, token: &str) -> ClientResult<PushOutcome> {
        let entries = match self.push_scope {
            PushScope::Dirty => self.replica.dirty_entries_for(owner_id),
            PushScope::Full => self.replica.entries_for(owner_id),
        };

        let mut outcome = PushOutcome::default();
        let mut records = Vec::with_capacity(entries.len());
        let mut pushed: Vec<(String, Timestamp)> = Vec::with_capacity(entries.len());

        for ReplicaEntry { sealed, .. } in entries {
            match sealed.open(self.replica.codec()) {
                Ok(record) => {
                    pushed.push((record.secret_id.clone(), record.last_changed));
                    records.push(DataRecord::from(record));
                }
                Err(err) => {
                    tracing::warn!(key = %sealed.key(), error = %err, "replica entry unreadable, not pushed");
                    outcome.unreadable += 1;
                }
            }
        }

        if records.is_empty() {
            return Ok(outcome);
        }

        outcome.pushed = records.len();
        outcome.report = self.transport.client_sync(token, records)?;

        pushed.retain(|(id, _)| !outcome.report.has_failed(id));
        self.replica.mark_clean(owner_id, &pushed)?;

        self.stats.write().records_pushed += outcome.pushed as u64;
        Ok(outcome)
    }
}
