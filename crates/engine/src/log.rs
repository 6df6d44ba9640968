//! Append-only revision logs
//!
//! A [`RevisionLog`] stores one row per `(key, revision)`. The store keeps
//! three of them:
//!
//! - the spine ([`EntityRevisionLog`]): one scalar snapshot per entity per revision
//! - two attribute logs ([`AttributeRevisionLog`]): one row per attribute
//!   value instance per revision, for properties and for references
//!
//! Rows are never changed once written. `update` and `delete` exist only to
//! refuse.

use std::fmt;
use std::sync::Arc;

use revstore_core::{
    And, AttributeEntry, AttributeValueId, BoxedPredicate, EntityId, EntitySnapshot, Error, Result,
    RevisionId, RevisionKind, RevisionNumber, SpineEntry,
};
use revstore_storage::{ReadView, RowCursor, Table, Transaction};

use crate::populate::AttributeRow;
use crate::predicates::{AttributeValuesAtOrBefore, EntityIdIs, RevisionAtMost};

/// Spine table name
pub const ENTITY_REVISION_TABLE: &str = "entity_revision";
/// Property value table name
pub const PROPERTY_REVISION_TABLE: &str = "property_value_revision";
/// Reference value table name
pub const REFERENCE_REVISION_TABLE: &str = "reference_value_revision";

/// Per-entity scalar snapshots
pub type EntityRevisionLog = RevisionLog<EntityId, SpineEntry>;

/// Per-attribute-value rows with values of type `V`
pub type AttributeRevisionLog<V> = RevisionLog<AttributeValueId, AttributeEntry<V>>;

/// Append-only log keyed by `RevisionId<K>`
pub struct RevisionLog<K, V> {
    table: Arc<Table<RevisionId<K>, V>>,
}

impl<K, V> Clone for RevisionLog<K, V> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K, V> fmt::Debug for RevisionLog<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevisionLog").field("table", &self.table).finish()
    }
}

impl<K, V> RevisionLog<K, V>
where
    K: Clone + Ord + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty log backed by table `name`
    pub fn new(name: &'static str, page_size: usize) -> Self {
        Self {
            table: Table::with_page_size(name, page_size),
        }
    }

    /// Backing table
    pub fn table(&self) -> &Arc<Table<RevisionId<K>, V>> {
        &self.table
    }

    /// Append one row
    pub fn insert(&self, txn: &mut Transaction<'_>, key: RevisionId<K>, value: V) -> Result<()> {
        self.table.insert(txn, key, value)
    }

    /// Append a batch of rows as one insert round
    pub fn insert_all(&self, txn: &mut Transaction<'_>, rows: Vec<(RevisionId<K>, V)>) -> Result<usize> {
        self.table.insert_all(txn, rows)
    }

    /// Always fails: rows are immutable
    pub fn update(&self, _txn: &mut Transaction<'_>, key: &RevisionId<K>, _value: V) -> Result<()> {
        Err(Error::unsupported(format!(
            "update of {} in append-only log {}",
            key,
            self.table.name()
        )))
    }

    /// Always fails: rows are never removed
    pub fn delete(&self, _txn: &mut Transaction<'_>, key: &RevisionId<K>) -> Result<()> {
        Err(Error::unsupported(format!(
            "delete of {} in append-only log {}",
            key,
            self.table.name()
        )))
    }

    /// Row at exactly `key`
    pub fn get(&self, view: &impl ReadView, key: &RevisionId<K>) -> Option<V> {
        self.table.get(view, key)
    }

    /// True if a row exists at exactly `key`
    pub fn exists(&self, view: &impl ReadView, key: &RevisionId<K>) -> bool {
        self.table.exists(view, key)
    }

    /// Rows matching `predicate`, newest revision first
    pub fn query(
        &self,
        view: &impl ReadView,
        predicate: BoxedPredicate<RevisionId<K>, V>,
    ) -> RowCursor<RevisionId<K>, V> {
        self.table.scan(view, predicate)
    }

    /// Keys of rows matching `predicate`, newest revision first
    pub fn keys(
        &self,
        view: &impl ReadView,
        predicate: BoxedPredicate<RevisionId<K>, V>,
    ) -> impl Iterator<Item = RevisionId<K>> {
        self.query(view, predicate).keys()
    }
}

impl EntityRevisionLog {
    /// Append the spine row of one entity change
    ///
    /// Empty code and URI are stored as absent.
    pub fn insert_snapshot(
        &self,
        txn: &mut Transaction<'_>,
        entity: EntityId,
        revision: RevisionNumber,
        kind: RevisionKind,
        snapshot: Option<EntitySnapshot>,
    ) -> Result<RevisionId<EntityId>> {
        let key = RevisionId::new(entity, revision);
        self.insert(
            txn,
            key.clone(),
            SpineEntry::new(kind, snapshot.map(EntitySnapshot::normalized)),
        )?;
        Ok(key)
    }

    /// Newest spine row of `entity` at or before `revision`
    pub fn latest_at(
        &self,
        view: &impl ReadView,
        entity: &EntityId,
        revision: RevisionNumber,
    ) -> Option<(RevisionId<EntityId>, SpineEntry)> {
        let predicate = And::<RevisionId<EntityId>, SpineEntry>::new(Vec::new())
            .and(RevisionAtMost(revision))
            .and(EntityIdIs::new(entity.clone()));
        let mut cursor = self.query(view, Box::new(predicate));
        let latest = cursor.next();
        cursor.close();
        latest
    }
}

impl<V> AttributeRevisionLog<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Every row of the entity of `id` with revision at or before `id.revision`
    pub fn entries_up_to(&self, view: &impl ReadView, id: &RevisionId<EntityId>) -> Vec<AttributeRow<V>> {
        self.query(view, Box::new(AttributeValuesAtOrBefore::new(id)))
            .collect()
    }
}
