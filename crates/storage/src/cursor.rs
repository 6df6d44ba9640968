//! Paged scan cursors
//!
//! A [`RowCursor`] walks a table newest-first, one page at a time, without
//! holding any lock between pages. It merges the caller's staged rows (taken
//! once when the cursor is opened) with committed pages.
//!
//! Open cursors are counted on their table. The count drops when the cursor
//! is drained, closed, or dropped, so every exit path releases it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use revstore_core::BoxedPredicate;

use crate::table::{RowKey, Table};

/// Lazy, single-pass scan over one table
pub struct RowCursor<K, V>
where
    K: RowKey,
    V: Clone + Send + Sync + 'static,
{
    table: Arc<Table<K, V>>,
    predicate: BoxedPredicate<K, V>,
    watermark: u64,
    staged: VecDeque<(K, V)>,
    page: VecDeque<(K, V)>,
    resume_before: Option<K>,
    committed_done: bool,
    released: bool,
}

impl<K, V> RowCursor<K, V>
where
    K: RowKey,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn open(
        table: Arc<Table<K, V>>,
        predicate: BoxedPredicate<K, V>,
        watermark: u64,
        staged: Vec<(K, V)>,
    ) -> Self {
        table.open_cursors.fetch_add(1, Ordering::SeqCst);
        Self {
            table,
            predicate,
            watermark,
            staged: staged.into(),
            page: VecDeque::new(),
            resume_before: None,
            committed_done: false,
            released: false,
        }
    }

    /// Release the cursor without draining it
    pub fn close(self) {
        drop(self);
    }

    /// Only the keys of the remaining rows
    pub fn keys(self) -> impl Iterator<Item = K> {
        self.map(|(key, _)| key)
    }

    fn fill_page(&mut self) {
        if self.committed_done || !self.page.is_empty() {
            return;
        }
        let page_size = self.table.page_size;
        let rows = self.table.rows.read();
        let range = match &self.resume_before {
            Some(before) => rows.range(..before.clone()),
            None => rows.range(..),
        };
        let mut examined = 0usize;
        let mut last = None;
        for (key, row) in range.rev() {
            examined += 1;
            last = Some(key);
            if row.commit_seq <= self.watermark && self.predicate.test(key, &row.value) {
                self.page.push_back((key.clone(), row.value.clone()));
            }
            if examined == page_size {
                break;
            }
        }
        if examined < page_size {
            self.committed_done = true;
        }
        self.resume_before = last.cloned();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.table.open_cursors.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl<K, V> Iterator for RowCursor<K, V>
where
    K: RowKey,
    V: Clone + Send + Sync + 'static,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.released {
                return None;
            }
            self.fill_page();

            let take_staged = match (self.staged.front(), self.page.front()) {
                (Some((staged, _)), Some((committed, _))) => staged > committed,
                (Some(_), None) => self.committed_done,
                (None, Some(_)) => false,
                (None, None) => {
                    if self.committed_done {
                        self.release();
                        return None;
                    }
                    // Page examined rows but none matched; fetch the next one
                    continue;
                }
            };

            if take_staged {
                return self.staged.pop_front();
            }
            if let Some(row) = self.page.pop_front() {
                return Some(row);
            }
        }
    }
}

impl<K, V> Drop for RowCursor<K, V>
where
    K: RowKey,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.release();
    }
}

impl<K, V> fmt::Debug for RowCursor<K, V>
where
    K: RowKey,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowCursor")
            .field("table", &self.table.name())
            .field("predicate", &self.predicate)
            .field("released", &self.released)
            .finish()
    }
}
