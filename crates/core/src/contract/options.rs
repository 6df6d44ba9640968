//! Save modes and write options

use super::RevisionNumber;
use serde::{Deserialize, Serialize};

/// How a save treats existing rows
///
/// Revision logs only ever accept `Insert`; the other modes exist so callers
/// sharing one save API across stores get a clear refusal instead of a
/// silent overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveMode {
    /// Append new rows only
    Insert,
    /// Overwrite existing rows
    Update,
    /// Insert or overwrite
    Upsert,
}

/// Options for a write call
///
/// # Example
///
/// ```
/// use revstore_core::{RevisionNumber, WriteOptions};
///
/// // Let the store allocate a fresh revision
/// let opts = WriteOptions::default();
/// assert!(opts.revision.is_none());
///
/// // Join a revision already minted for a wider change
/// let opts = WriteOptions::default().with_revision(RevisionNumber::new(12));
/// assert_eq!(opts.revision, Some(RevisionNumber::new(12)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Reuse this revision instead of allocating a new one
    pub revision: Option<RevisionNumber>,
}

impl WriteOptions {
    /// Default options: allocate a fresh revision
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an already allocated revision
    pub fn with_revision(mut self, revision: RevisionNumber) -> Self {
        self.revision = Some(revision);
        self
    }
}
