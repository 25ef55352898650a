//! JSON-lines record logs.
//!
//! A [`RecordLog`] frames serde values as one JSON object per line on top of
//! a [`LogBackend`]. State is rebuilt by replaying every line in order; the
//! last line for a key wins. Logs are never compacted.

use crate::error::{KeeperError, KeeperResult};
use keeper_storage::LogBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// What to do with a line that does not parse during replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorruptLogPolicy {
    /// Log a warning with the line number and keep going.
    #[default]
    Skip,
    /// Abort replay with `LocalPersistenceFailure`.
    Fail,
}

/// The result of replaying a log.
#[derive(Debug)]
pub struct Replay<T> {
    /// Parsed records, in log order.
    pub records: Vec<T>,
    /// Number of lines that failed to parse and were skipped.
    pub skipped: usize,
}

/// An append-only log of serde records, one JSON object per line.
pub struct RecordLog<T> {
    name: String,
    backend: Box<dyn LogBackend>,
    sync_on_append: bool,
    // Set when the log ends in a torn line, so the next append starts fresh.
    needs_newline: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> RecordLog<T> {
    /// Wraps `backend`. `name` identifies the log in diagnostics.
    pub fn new(name: impl Into<String>, backend: Box<dyn LogBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
            sync_on_append: false,
            needs_newline: false,
            _record: PhantomData,
        }
    }

    /// Calls `sync` instead of `flush` after every append.
    #[must_use]
    pub fn with_sync_on_append(mut self, sync: bool) -> Self {
        self.sync_on_append = sync;
        self
    }

    /// Returns the log's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads and parses every line in the log.
    ///
    /// Blank lines are ignored. A final line without a trailing newline is
    /// treated like any other line: if it parses it counts, otherwise it is
    /// corrupt.
    pub fn replay(&mut self, policy: CorruptLogPolicy) -> KeeperResult<Replay<T>> {
        let data = self.backend.read_all()?;
        self.needs_newline = !data.is_empty() && !data.ends_with(b"\n");

        let mut records = Vec::new();
        let mut skipped = 0;

        for (index, line) in data.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let line_no = index + 1;
            match serde_json::from_slice::<T>(line) {
                Ok(record) => records.push(record),
                Err(e) => match policy {
                    CorruptLogPolicy::Skip => {
                        tracing::warn!(
                            log = %self.name,
                            line = line_no,
                            error = %e,
                            "skipping corrupt log line"
                        );
                        skipped += 1;
                    }
                    CorruptLogPolicy::Fail => {
                        return Err(KeeperError::local_persistence(format!(
                            "{}: corrupt line {line_no}: {e}",
                            self.name
                        )));
                    }
                },
            }
        }

        tracing::debug!(
            log = %self.name,
            records = records.len(),
            skipped,
            "replayed log"
        );
        Ok(Replay { records, skipped })
    }

    /// Appends one record and flushes (or syncs) the backend.
    pub fn append(&mut self, record: &T) -> KeeperResult<()> {
        let mut line = Vec::new();
        if self.needs_newline {
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, record)
            .map_err(|e| KeeperError::local_persistence(format!("{}: {e}", self.name)))?;
        line.push(b'\n');

        self.backend.append(&line)?;
        if self.sync_on_append {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }
        self.needs_newline = false;
        Ok(())
    }
}

impl<T> std::fmt::Debug for RecordLog<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLog")
            .field("name", &self.name)
            .field("sync_on_append", &self.sync_on_append)
            .finish_non_exhaustive()
    }
}
