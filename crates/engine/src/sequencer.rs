//! Revision number allocation
//!
//! Revision numbers come from a single allocation record in the backing
//! store, never from an in-process counter. Allocation takes the record's row
//! lock inside the caller's transaction, so the number and the metadata row
//! written next to it commit or vanish together.

use std::sync::Arc;

use tracing::debug;

use revstore_core::{Actor, Result, RevisionNumber};
use revstore_storage::{Database, Sequence, Transaction};

/// Allocates strictly increasing revision numbers
#[derive(Debug, Clone)]
pub struct RevisionSequencer {
    sequence: Arc<Sequence>,
}

impl RevisionSequencer {
    /// Sequencer over the record `name`, created at `first` if missing
    ///
    /// Sequencers created with the same name on the same database share
    /// one record.
    pub fn new(db: &Database, name: &str, first: RevisionNumber) -> Self {
        Self {
            sequence: db.create_sequence(name, first.as_u64()),
        }
    }

    /// Return a fresh revision number and advance the record
    ///
    /// The record stays locked by `txn` until it commits or rolls back.
    /// On rollback the number is handed out again.
    pub fn get_and_advance(&self, txn: &mut Transaction<'_>, actor: &Actor) -> Result<RevisionNumber> {
        let number = RevisionNumber::new(txn.next_value(self.sequence.name())?);
        debug!(
            target: "revstore::sequencer",
            revision = number.as_u64(),
            author = actor.username(),
            txn = txn.id(),
            "allocated revision"
        );
        Ok(number)
    }

    /// Next number to be handed out, as of the last commit
    pub fn current(&self) -> RevisionNumber {
        RevisionNumber::new(self.sequence.peek())
    }
}
