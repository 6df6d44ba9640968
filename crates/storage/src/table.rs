//! Append-only tables
//!
//! A [`Table`] is the in-memory equivalent of one relational table of the
//! revision store. It offers exactly three primitives: insert, exact-key
//! lookup and predicate-filtered scan. There is no update or delete.
//!
//! # Layout
//!
//! - `rows`: committed rows in a `BTreeMap` ordered by revision then key, so a
//!   reverse range walk yields rows newest-first
//! - `pending`: rows staged by open transactions, keyed by transaction id;
//!   visible only to that transaction until commit
//!
//! Every commit stamps its rows with a table-local commit sequence. Scans
//! remember the sequence current when they were opened and skip anything
//! committed later.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use revstore_core::{BoxedPredicate, Error, Result, RevisionId, RevisionNumber};

use crate::cursor::RowCursor;
use crate::transaction::{Participant, ReadView, Transaction, TxnId};

/// Default number of rows fetched per scan page
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Primary key of a table row
///
/// Keys must order by revision first so that ordered iteration is revision
/// ordered.
pub trait RowKey: Clone + Ord + fmt::Display + Send + Sync + 'static {
    /// Revision the row belongs to
    fn revision(&self) -> RevisionNumber;
}

impl<K> RowKey for RevisionId<K>
where
    K: Clone + Ord + fmt::Display + Send + Sync + 'static,
{
    fn revision(&self) -> RevisionNumber {
        self.revision
    }
}

impl RowKey for RevisionNumber {
    fn revision(&self) -> RevisionNumber {
        *self
    }
}

/// Committed row with its commit stamp
#[derive(Debug, Clone)]
pub(crate) struct StoredRow<V> {
    pub(crate) value: V,
    pub(crate) commit_seq: u64,
}

/// Append-only table
pub struct Table<K, V> {
    name: &'static str,
    pub(crate) rows: RwLock<BTreeMap<K, StoredRow<V>>>,
    pending: DashMap<TxnId, BTreeMap<K, V>>,
    pub(crate) commit_seq: AtomicU64,
    pub(crate) open_cursors: AtomicUsize,
    insert_rounds: AtomicU64,
    pub(crate) page_size: usize,
}

impl<K, V> fmt::Debug for Table<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("rows", &self.rows.read().len())
            .field("open_cursors", &self.open_cursors.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K, V> Table<K, V>
where
    K: RowKey,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty table
    pub fn new(name: &'static str) -> Arc<Self> {
        Self::with_page_size(name, DEFAULT_PAGE_SIZE)
    }

    /// Create an empty table with a custom scan page size
    pub fn with_page_size(name: &'static str, page_size: usize) -> Arc<Self> {
        Arc::new(Self {
            name,
            rows: RwLock::new(BTreeMap::new()),
            pending: DashMap::new(),
            commit_seq: AtomicU64::new(0),
            open_cursors: AtomicUsize::new(0),
            insert_rounds: AtomicU64::new(0),
            page_size: page_size.max(1),
        })
    }

    /// Table name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of committed rows
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// True if no row has been committed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of insert calls that staged their rows
    ///
    /// Each successful call to [`Table::insert`] or [`Table::insert_all`] is
    /// one round, regardless of how many rows it carries. Rejected calls do
    /// not count.
    pub fn insert_rounds(&self) -> u64 {
        self.insert_rounds.load(Ordering::SeqCst)
    }

    /// Number of scans that have not been drained or dropped yet
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// Stage one row in `txn`
    pub fn insert(self: &Arc<Self>, txn: &mut Transaction<'_>, key: K, value: V) -> Result<()> {
        self.insert_all(txn, vec![(key, value)]).map(|_| ())
    }

    /// Stage a batch of rows in `txn` as one insert round
    ///
    /// Fails with [`Error::DuplicateKey`] (staging nothing) if any key is
    /// already committed, already staged by `txn`, or repeated in the batch.
    pub fn insert_all(
        self: &Arc<Self>,
        txn: &mut Transaction<'_>,
        rows: Vec<(K, V)>,
    ) -> Result<usize> {
        txn.ensure_active()?;
        txn.enlist(self.clone());

        let count = rows.len();
        let mut batch = BTreeMap::new();
        {
            let committed = self.rows.read();
            for (key, value) in rows {
                if committed.contains_key(&key) || batch.contains_key(&key) {
                    return Err(self.duplicate(&key));
                }
                batch.insert(key, value);
            }
        }
        {
            // Rows committed by others meanwhile are caught again at commit
            let mut staged = self.pending.entry(txn.id()).or_default();
            if let Some(key) = batch.keys().find(|key| staged.contains_key(*key)) {
                return Err(self.duplicate(key));
            }
            staged.append(&mut batch);
        }
        self.insert_rounds.fetch_add(1, Ordering::SeqCst);

        trace!(target: "revstore::storage", table = self.name, rows = count, "staged rows");
        Ok(count)
    }

    /// Exact-key lookup
    pub fn get(&self, view: &impl ReadView, key: &K) -> Option<V> {
        if let Some(txn) = view.txn_id() {
            if let Some(staged) = self.pending.get(&txn) {
                if let Some(value) = staged.get(key) {
                    return Some(value.clone());
                }
            }
        }
        self.rows.read().get(key).map(|row| row.value.clone())
    }

    /// Exact-key existence check
    pub fn exists(&self, view: &impl ReadView, key: &K) -> bool {
        if let Some(txn) = view.txn_id() {
            if let Some(staged) = self.pending.get(&txn) {
                if staged.contains_key(key) {
                    return true;
                }
            }
        }
        self.rows.read().contains_key(key)
    }

    /// Scan rows matching `predicate`, newest revision first
    ///
    /// The cursor sees the rows committed when it is opened plus, for a
    /// transaction view, the rows that transaction had staged at that point.
    pub fn scan(
        self: &Arc<Self>,
        view: &impl ReadView,
        predicate: BoxedPredicate<K, V>,
    ) -> RowCursor<K, V> {
        let mut staged: Vec<(K, V)> = match view.txn_id() {
            Some(txn) => self
                .pending
                .get(&txn)
                .map(|rows| {
                    rows.iter()
                        .filter(|(k, v)| predicate.test(k, v))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };
        staged.reverse();

        let watermark = self.commit_seq.load(Ordering::SeqCst);
        RowCursor::open(self.clone(), predicate, watermark, staged)
    }

    fn duplicate(&self, key: &K) -> Error {
        Error::DuplicateKey {
            table: self.name,
            key: key.to_string(),
        }
    }
}

impl<K, V> Participant for Table<K, V>
where
    K: RowKey,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn validate(&self, txn: TxnId) -> Result<()> {
        let Some(staged) = self.pending.get(&txn) else {
            return Ok(());
        };
        let committed = self.rows.read();
        match staged.keys().find(|key| committed.contains_key(*key)) {
            Some(key) => Err(self.duplicate(key)),
            None => Ok(()),
        }
    }

    fn apply(&self, txn: TxnId) -> usize {
        let Some((_, staged)) = self.pending.remove(&txn) else {
            return 0;
        };
        let count = staged.len();
        let mut committed = self.rows.write();
        let seq = self.commit_seq.load(Ordering::SeqCst) + 1;
        for (key, value) in staged {
            committed.insert(
                key,
                StoredRow {
                    value,
                    commit_seq: seq,
                },
            );
        }
        // Publish the new stamp only once every row carries it
        self.commit_seq.store(seq, Ordering::SeqCst);
        count
    }

    fn discard(&self, txn: TxnId) {
        self.pending.remove(&txn);
    }
}
