//! Transactions
//!
//! A [`Transaction`] stages inserts across any number of tables and holds
//! sequence row locks. Commit applies every staged row under the database
//! commit lock, after re-checking primary keys against rows committed by
//! others in the meantime. All-or-nothing: either every table applies or none
//! does.
//!
//! State transitions:
//! - `Active` → `Committed` (commit succeeded)
//! - `Active` → `RolledBack` (commit failed, explicit rollback, or drop)
//!
//! Dropping an active transaction rolls it back, so an early `?` return
//! never leaves staged rows or held sequence locks behind.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use revstore_core::{Error, Result};

use crate::database::Database;
use crate::sequence::SequenceLock;

/// Transaction identifier, unique per database
pub type TxnId = u64;

/// Where reads are served from
///
/// Reading through a [`Database`] sees committed rows; reading through a
/// [`Transaction`] additionally sees that transaction's staged rows.
pub trait ReadView {
    /// Transaction whose staged rows are visible, if any
    fn txn_id(&self) -> Option<TxnId>;
}

impl ReadView for Database {
    fn txn_id(&self) -> Option<TxnId> {
        None
    }
}

impl<T: ReadView + ?Sized> ReadView for &T {
    fn txn_id(&self) -> Option<TxnId> {
        (**self).txn_id()
    }
}

/// A table taking part in a transaction
pub(crate) trait Participant: Send + Sync {
    fn name(&self) -> &'static str;
    /// Check staged rows against committed rows
    fn validate(&self, txn: TxnId) -> Result<()>;
    /// Move staged rows into committed storage, returning how many moved
    fn apply(&self, txn: TxnId) -> usize;
    /// Drop staged rows
    fn discard(&self, txn: TxnId);
}

/// Status of a transaction in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting reads and writes
    Active,
    /// Committed successfully
    Committed,
    /// Rolled back
    RolledBack,
}

/// Unit of atomic work against one [`Database`]
pub struct Transaction<'db> {
    id: TxnId,
    db: &'db Database,
    status: TransactionStatus,
    participants: Vec<Arc<dyn Participant>>,
    sequences: Vec<SequenceLock>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(id: TxnId, db: &'db Database) -> Self {
        Self {
            id,
            db,
            status: TransactionStatus::Active,
            participants: Vec::new(),
            sequences: Vec::new(),
        }
    }

    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Database this transaction runs against
    pub fn database(&self) -> &'db Database {
        self.db
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.status {
            TransactionStatus::Active => Ok(()),
            other => Err(Error::storage(format!(
                "transaction {} is not active ({:?})",
                self.id, other
            ))),
        }
    }

    pub(crate) fn enlist(&mut self, participant: Arc<dyn Participant>) {
        let ptr = Arc::as_ptr(&participant) as *const ();
        if !self
            .participants
            .iter()
            .any(|p| Arc::as_ptr(p) as *const () == ptr)
        {
            self.participants.push(participant);
        }
    }

    /// Allocate the next value of a sequence
    ///
    /// Takes the sequence row lock on first use and keeps it until the
    /// transaction ends. Blocks while another transaction holds it.
    pub fn next_value(&mut self, sequence: &str) -> Result<u64> {
        self.ensure_active()?;
        if let Some(lock) = self.sequences.iter_mut().find(|l| l.name() == sequence) {
            return lock
                .get_and_advance()
                .ok_or_else(|| Error::storage(format!("sequence {} exhausted", sequence)));
        }

        let mut lock = self.db.sequence(sequence).lock();
        let value = lock
            .get_and_advance()
            .ok_or_else(|| Error::storage(format!("sequence {} exhausted", sequence)))?;
        self.sequences.push(lock);
        Ok(value)
    }

    /// Commit all staged rows and release sequence locks
    ///
    /// On failure the transaction is rolled back and nothing is applied.
    pub fn commit(mut self) -> Result<()> {
        self.ensure_active()?;
        let applied = {
            let _commit = self.db.commit_lock.lock();
            for participant in &self.participants {
                if let Err(e) = participant.validate(self.id) {
                    warn!(
                        target: "revstore::storage",
                        txn = self.id,
                        table = participant.name(),
                        error = %e,
                        "commit validation failed"
                    );
                    return Err(e);
                }
            }
            self.participants
                .iter()
                .map(|p| p.apply(self.id))
                .sum::<usize>()
        };

        for lock in self.sequences.drain(..) {
            lock.commit();
        }
        self.participants.clear();
        self.status = TransactionStatus::Committed;
        debug!(target: "revstore::storage", txn = self.id, rows = applied, "committed");
        Ok(())
    }

    /// Discard all staged rows and restore sequences
    pub fn rollback(mut self) {
        self.rollback_in_place();
    }

    fn rollback_in_place(&mut self) {
        if self.status != TransactionStatus::Active {
            return;
        }
        for participant in self.participants.drain(..) {
            participant.discard(self.id);
        }
        for lock in self.sequences.drain(..) {
            lock.rollback();
        }
        self.status = TransactionStatus::RolledBack;
        debug!(target: "revstore::storage", txn = self.id, "rolled back");
    }
}

impl ReadView for Transaction<'_> {
    fn txn_id(&self) -> Option<TxnId> {
        Some(self.id)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.rollback_in_place();
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("status", &self.status)
            .field(
                "tables",
                &self.participants.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
