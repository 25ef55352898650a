//! Log backend trait definition.

use crate::error::StorageResult;

/// An append-only byte log.
///
/// Backends never rewrite or truncate what was appended: the only way state
/// changes is by adding bytes at the end. Readers replay the whole log to
/// rebuild current state.
///
/// # Invariants
///
/// - `append` returns the offset where the data begins
/// - `read_all` returns every byte appended so far, in order
/// - `sync` makes all appended data survive process termination
/// - Backends must be `Send + Sync` so services can share them across threads
pub trait LogBackend: Send + Sync {
    /// Reads the entire log.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be read.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the log and returns its starting offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the backend is read-only.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Flushes and waits until the data is on durable media.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;
}
