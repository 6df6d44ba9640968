//! Revision metadata
//!
//! One immutable row per revision number. Rows in every log point at a
//! revision through their key; the metadata row says who made it and when.

use std::sync::Arc;

use tracing::error;

use revstore_core::{Error, Result, RevisionMetadata, RevisionNumber};
use revstore_storage::{ReadView, Table, Transaction};

/// Table name of the metadata rows
pub const METADATA_TABLE: &str = "revision";

/// Persists `{number, author, timestamp}` records
#[derive(Debug, Clone)]
pub struct RevisionMetadataStore {
    table: Arc<Table<RevisionNumber, RevisionMetadata>>,
}

impl RevisionMetadataStore {
    /// Create an empty store
    pub fn new(page_size: usize) -> Self {
        Self {
            table: Table::with_page_size(METADATA_TABLE, page_size),
        }
    }

    /// Backing table
    pub fn table(&self) -> &Arc<Table<RevisionNumber, RevisionMetadata>> {
        &self.table
    }

    /// Persist a metadata record
    ///
    /// Fails with `DuplicateKey` if the number already has metadata.
    pub fn save(&self, txn: &mut Transaction<'_>, metadata: RevisionMetadata) -> Result<RevisionNumber> {
        let number = metadata.number;
        self.table.insert(txn, number, metadata)?;
        Ok(number)
    }

    /// Metadata of a revision, if recorded
    pub fn get(&self, view: &impl ReadView, number: RevisionNumber) -> Option<RevisionMetadata> {
        self.table.get(view, &number)
    }

    /// Metadata of a revision that rows are known to reference
    ///
    /// A miss means the logs are inconsistent and is reported as
    /// `InvariantViolation`.
    pub fn require(&self, view: &impl ReadView, number: RevisionNumber) -> Result<RevisionMetadata> {
        self.get(view, number).ok_or_else(|| {
            error!(target: "revstore::metadata", revision = number.as_u64(), "revision has no metadata");
            Error::invariant(format!("no metadata for revision {}", number))
        })
    }

    /// True if the revision has metadata
    pub fn exists(&self, view: &impl ReadView, number: RevisionNumber) -> bool {
        self.table.exists(view, &number)
    }
}
