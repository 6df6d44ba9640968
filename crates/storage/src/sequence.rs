//! Allocation records
//!
//! A [`Sequence`] is a single row holding the next value to hand out. A
//! transaction that allocates from it takes the row lock and keeps it until
//! commit or rollback, exactly like `SELECT ... FOR UPDATE` on a counter row:
//!
//! - concurrent allocators queue on the lock, so values never collide
//! - a rollback restores the value it found, so no number is skipped or leaked
//!
//! A thread must not allocate from the same sequence in two transactions at
//! once; the second would wait for the first forever.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

/// Named allocation record
#[derive(Debug)]
pub struct Sequence {
    name: String,
    row: Arc<Mutex<u64>>,
    committed: AtomicU64,
}

impl Sequence {
    pub(crate) fn new(name: impl Into<String>, initial: u64) -> Self {
        Self {
            name: name.into(),
            row: Arc::new(Mutex::new(initial)),
            committed: AtomicU64::new(initial),
        }
    }

    /// Sequence name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next value as of the last commit, without taking the row lock
    pub fn peek(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    pub(crate) fn lock(self: &Arc<Self>) -> SequenceLock {
        let guard = self.row.lock_arc();
        let original = *guard;
        SequenceLock {
            sequence: self.clone(),
            guard,
            original,
        }
    }
}

/// Row lock held by a transaction on one sequence
pub(crate) struct SequenceLock {
    sequence: Arc<Sequence>,
    guard: ArcMutexGuard<RawMutex, u64>,
    original: u64,
}

impl SequenceLock {
    pub(crate) fn name(&self) -> &str {
        self.sequence.name()
    }

    /// Return the current value and advance the row
    pub(crate) fn get_and_advance(&mut self) -> Option<u64> {
        let current = *self.guard;
        *self.guard = current.checked_add(1)?;
        Some(current)
    }

    /// Publish the advanced value and release the row
    pub(crate) fn commit(self) {
        self.sequence.committed.store(*self.guard, Ordering::SeqCst);
    }

    /// Restore the value found when the lock was taken and release the row
    pub(crate) fn rollback(mut self) {
        *self.guard = self.original;
    }
}
