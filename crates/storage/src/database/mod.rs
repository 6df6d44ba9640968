//! Database handle
//!
//! A [`Database`] owns what is shared by every table of one store: the
//! commit lock, transaction ids and named sequences. Tables themselves are
//! owned by their callers and enlist in a transaction when written.
//!
//! # Example
//!
//! ```
//! use revstore_storage::Database;
//!
//! let db = Database::new();
//! let first = db.transaction(|txn| txn.next_value("revision")).unwrap();
//! let second = db.transaction(|txn| txn.next_value("revision")).unwrap();
//! assert_eq!(second, first + 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use revstore_core::Result;

use crate::sequence::Sequence;
use crate::transaction::Transaction;

/// Shared state of one store
pub struct Database {
    pub(crate) commit_lock: Mutex<()>,
    next_txn: AtomicU64,
    sequences: DashMap<String, Arc<Sequence>>,
}

impl Database {
    /// Create an empty database
    pub fn new() -> Self {
        Self {
            commit_lock: Mutex::new(()),
            next_txn: AtomicU64::new(1),
            sequences: DashMap::new(),
        }
    }

    /// Start a transaction
    ///
    /// The transaction rolls back when dropped unless committed.
    pub fn begin(&self) -> Transaction<'_> {
        let id = self.next_txn.fetch_add(1, Ordering::SeqCst);
        Transaction::new(id, self)
    }

    /// Run `f` in a transaction, committing on `Ok` and rolling back on `Err`
    ///
    /// # Example
    /// ```text
    /// let n = db.transaction(|txn| {
    ///     table.insert(txn, key, value)?;
    ///     Ok(1)
    /// })?;
    /// ```
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut txn = self.begin();
        let value = f(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Create a sequence starting at `initial`, or return the existing one
    ///
    /// `initial` is ignored when the sequence already exists.
    pub fn create_sequence(&self, name: &str, initial: u64) -> Arc<Sequence> {
        self.sequences
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(target: "revstore::storage", sequence = name, initial, "created sequence");
                Arc::new(Sequence::new(name, initial))
            })
            .clone()
    }

    /// Sequence by name, created at 1 if missing
    pub fn sequence(&self, name: &str) -> Arc<Sequence> {
        self.create_sequence(name, 1)
    }

    /// Next value of a sequence as of the last commit, if the sequence exists
    pub fn sequence_value(&self, name: &str) -> Option<u64> {
        self.sequences.get(name).map(|s| s.peek())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("next_txn", &self.next_txn.load(Ordering::Relaxed))
            .field("sequences", &self.sequences.len())
            .finish()
    }
}
