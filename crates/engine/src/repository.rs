//! Versioned entity repository
//!
//! Orchestrates the sequencer, the metadata store and the three logs.
//!
//! ## Write path
//!
//! A save resolves one revision number (supplied, or allocated together with
//! its metadata row), then decomposes every entity into one spine row plus
//! one row per property and reference value. Attribute value instances that
//! were live before the revision but are missing from the new state get a
//! tombstone row. A removal writes a spine row without snapshot and
//! tombstones everything live.
//!
//! ## Read path
//!
//! Reads fetch the spine row, then every attribute row of the entity up to
//! that revision, and hand them to [`populate`](crate::populate::populate).
//!
//! ## Transactions
//!
//! [`save`](VersionedEntityRepository::save) runs inside the caller's
//! transaction and never commits. [`save_all`](VersionedEntityRepository::save_all)
//! commits one transaction per batch, so a failure part way through leaves
//! earlier batches in place.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use revstore_core::{
    Actor, AttributeEntry, AttributeValueId, BoxedPredicate, EntityChange, EntityId,
    EntityRevision, Error, PropertyValue, ReferenceValue, Result, RevisionId, RevisionKind,
    RevisionMetadata, RevisionNumber, SaveMode, SpineEntry, WriteOptions,
};
use revstore_storage::{Database, ReadView, Transaction};

use crate::config::RevstoreConfig;
use crate::log::{
    AttributeRevisionLog, EntityRevisionLog, RevisionLog, ENTITY_REVISION_TABLE,
    PROPERTY_REVISION_TABLE, REFERENCE_REVISION_TABLE,
};
use crate::metadata::RevisionMetadataStore;
use crate::populate::{self, AttributeRow};
use crate::predicates::{AttributeValuesAtOrBefore, EntityIdIs, RevisionAtMost};
use crate::sequencer::RevisionSequencer;

/// Predicate over spine rows
pub type SpinePredicate = BoxedPredicate<RevisionId<EntityId>, SpineEntry>;

/// Rows produced by decomposing entity changes, one vector per log
#[derive(Default)]
struct DecomposedRows {
    spine: Vec<(RevisionId<EntityId>, SpineEntry)>,
    properties: Vec<AttributeRow<PropertyValue>>,
    references: Vec<AttributeRow<ReferenceValue>>,
}

/// Attribute value instances live before a revision, per entity
#[derive(Default)]
struct PriorState {
    properties: BTreeMap<EntityId, BTreeSet<AttributeValueId>>,
    references: BTreeMap<EntityId, BTreeSet<AttributeValueId>>,
}

/// Versioned store of entities with as-of reads
#[derive(Debug)]
pub struct VersionedEntityRepository {
    db: Arc<Database>,
    config: RevstoreConfig,
    sequencer: RevisionSequencer,
    metadata: RevisionMetadataStore,
    entities: EntityRevisionLog,
    properties: AttributeRevisionLog<PropertyValue>,
    references: AttributeRevisionLog<ReferenceValue>,
}

impl VersionedEntityRepository {
    /// Create a repository with empty logs on `db`
    ///
    /// # Errors
    ///
    /// Returns `Config` if `config` fails validation.
    pub fn new(db: Arc<Database>, config: RevstoreConfig) -> Result<Self> {
        config.validate()?;
        let page_size = config.scan_page_size;
        let sequencer = RevisionSequencer::new(
            &db,
            &config.revision_sequence,
            RevisionNumber::new(config.first_revision),
        );
        Ok(Self {
            sequencer,
            metadata: RevisionMetadataStore::new(page_size),
            entities: RevisionLog::new(ENTITY_REVISION_TABLE, page_size),
            properties: RevisionLog::new(PROPERTY_REVISION_TABLE, page_size),
            references: RevisionLog::new(REFERENCE_REVISION_TABLE, page_size),
            db,
            config,
        })
    }

    /// Create a repository with default configuration
    pub fn with_defaults(db: Arc<Database>) -> Result<Self> {
        Self::new(db, RevstoreConfig::default())
    }

    /// Database transactions are drawn from
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Active configuration
    pub fn config(&self) -> &RevstoreConfig {
        &self.config
    }

    /// Revision sequencer
    pub fn sequencer(&self) -> &RevisionSequencer {
        &self.sequencer
    }

    /// Revision metadata store
    pub fn metadata(&self) -> &RevisionMetadataStore {
        &self.metadata
    }

    /// Spine log
    pub fn entity_log(&self) -> &EntityRevisionLog {
        &self.entities
    }

    /// Property value log
    pub fn property_log(&self) -> &AttributeRevisionLog<PropertyValue> {
        &self.properties
    }

    /// Reference value log
    pub fn reference_log(&self) -> &AttributeRevisionLog<ReferenceValue> {
        &self.references
    }

    // ===== Writes =====

    /// Record one entity change in `txn`
    ///
    /// Only `SaveMode::Insert` is accepted. With `options.revision` set the
    /// change joins that revision, which must already have metadata;
    /// otherwise a new revision is allocated in `txn`.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` for any other mode, before anything is written
    /// - `InvalidInput` if `txn` belongs to another database, or an attribute
    ///   holds more values than a discriminator can number
    /// - `InvariantViolation` if the supplied revision has no metadata
    /// - `DuplicateKey` if the entity already has a row at the revision
    pub fn save(
        &self,
        txn: &mut Transaction<'_>,
        change: EntityChange,
        mode: SaveMode,
        options: &WriteOptions,
        actor: &Actor,
    ) -> Result<RevisionId<EntityId>> {
        require_insert_mode(mode)?;
        self.check_transaction(txn)?;

        let revision = match options.revision {
            Some(number) => self.metadata.require(&*txn, number)?,
            None => self.allocate(txn, actor)?,
        }
        .number;

        let prior = self.prior_state(&*txn, [change.id()], revision);
        let mut rows = DecomposedRows::default();
        let key = self.decompose(&prior, &change, revision, &mut rows)?;
        self.write(txn, rows)?;

        if self.config.log_writes {
            info!(target: "revstore::repository", author = actor.username(), id = %key, kind = %change.kind(), "saved entity");
        }
        Ok(key)
    }

    /// Record many entity changes under one shared revision
    ///
    /// Changes are written in batches of `batch_size`, one transaction per
    /// batch. The revision (and its metadata) is allocated in its own
    /// transaction first unless `options.revision` supplies one.
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` for a mode other than insert, before anything is written
    /// - `BatchAborted` if a batch fails; earlier batches stay committed and
    ///   later ones are not attempted
    pub fn save_all<I>(
        &self,
        changes: I,
        mode: SaveMode,
        options: &WriteOptions,
        actor: &Actor,
    ) -> Result<Vec<RevisionId<EntityId>>>
    where
        I: IntoIterator<Item = EntityChange>,
    {
        require_insert_mode(mode)?;

        let revision = match options.revision {
            Some(number) => self.metadata.require(self.db.as_ref(), number)?.number,
            None => self.db.transaction(|txn| self.allocate(txn, actor))?.number,
        };

        let batch_size = self.config.batch_size;
        let mut changes = changes.into_iter();
        let mut keys = Vec::new();
        let mut batch_number = 0usize;

        loop {
            let batch: Vec<EntityChange> = changes.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            batch_number += 1;

            match self.db.transaction(|txn| self.save_batch(txn, &batch, revision)) {
                Ok(batch_keys) => {
                    debug!(
                        target: "revstore::repository",
                        batch = batch_number,
                        entities = batch_keys.len(),
                        revision = revision.as_u64(),
                        "committed batch"
                    );
                    if self.config.log_writes {
                        for (key, change) in batch_keys.iter().zip(&batch) {
                            info!(target: "revstore::repository", author = actor.username(), id = %key, kind = %change.kind(), "saved entity");
                        }
                    }
                    keys.extend(batch_keys);
                }
                Err(source) => {
                    warn!(
                        target: "revstore::repository",
                        batch = batch_number,
                        committed = keys.len(),
                        revision = revision.as_u64(),
                        error = %source,
                        "batch aborted"
                    );
                    return Err(Error::BatchAborted {
                        committed: keys.len(),
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(keys)
    }

    /// Always fails: history is never removed
    pub fn delete(&self, id: &RevisionId<EntityId>, _options: &WriteOptions, _actor: &Actor) -> Result<()> {
        Err(Error::unsupported(format!(
            "delete of {} from versioned entity repository",
            id
        )))
    }

    // ===== Reads =====

    /// Entity as recorded at exactly `id`
    ///
    /// `None` means the entity has no spine row at that exact revision, even
    /// if it has one earlier.
    pub fn get(&self, view: &impl ReadView, id: &RevisionId<EntityId>) -> Option<EntityRevision> {
        let entry = self.entities.get(view, id)?;
        Some(self.populate(view, id, entry))
    }

    /// True if the entity has a spine row at exactly `id`
    pub fn exists(&self, view: &impl ReadView, id: &RevisionId<EntityId>) -> bool {
        self.entities.exists(view, id)
    }

    /// Entities of every spine row matching `predicate`, newest first
    ///
    /// The sequence is lazy and single-pass; dropping it early releases the
    /// underlying scan.
    pub fn values<'a, R: ReadView>(
        &'a self,
        view: &'a R,
        predicate: SpinePredicate,
    ) -> impl Iterator<Item = (RevisionId<EntityId>, EntityRevision)> + 'a {
        self.entities
            .query(view, predicate)
            .map(move |(id, entry)| {
                let entity = self.populate(view, &id, entry);
                (id, entity)
            })
    }

    /// Keys of every spine row matching `predicate`, newest first
    pub fn keys(
        &self,
        view: &impl ReadView,
        predicate: SpinePredicate,
    ) -> impl Iterator<Item = RevisionId<EntityId>> {
        self.entities.keys(view, predicate)
    }

    /// Number of spine rows matching `predicate`
    pub fn count(&self, view: &impl ReadView, predicate: SpinePredicate) -> u64 {
        self.keys(view, predicate).count() as u64
    }

    /// Entity as it stood at `revision`
    ///
    /// Resolves the entity's newest spine row at or before `revision`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the entity has no row at or before `revision`.
    pub fn get_as_of(
        &self,
        view: &impl ReadView,
        entity: &EntityId,
        revision: RevisionNumber,
    ) -> Result<(RevisionId<EntityId>, EntityRevision)> {
        let (id, entry) = self
            .entities
            .latest_at(view, entity, revision)
            .ok_or_else(|| Error::NotFound {
                entity: entity.clone(),
                revision,
            })?;
        let populated = self.populate(view, &id, entry);
        Ok((id, populated))
    }

    /// Every revision of `entity` with its metadata, newest first
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if a revision has no metadata.
    pub fn history(
        &self,
        view: &impl ReadView,
        entity: &EntityId,
    ) -> Result<Vec<(RevisionMetadata, RevisionId<EntityId>)>> {
        self.entities
            .keys(view, Box::new(EntityIdIs::new(entity.clone())))
            .map(|id| {
                let metadata = self.metadata.require(view, id.revision)?;
                Ok((metadata, id))
            })
            .collect()
    }

    // ===== Internals =====

    fn check_transaction(&self, txn: &Transaction<'_>) -> Result<()> {
        if std::ptr::eq(txn.database(), self.db.as_ref()) {
            Ok(())
        } else {
            Err(Error::invalid_input(format!(
                "transaction {} belongs to another database",
                txn.id()
            )))
        }
    }

    fn allocate(&self, txn: &mut Transaction<'_>, actor: &Actor) -> Result<RevisionMetadata> {
        let number = self.sequencer.get_and_advance(txn, actor)?;
        let metadata = RevisionMetadata::new(number, actor.username(), Utc::now());
        self.metadata.save(txn, metadata.clone())?;
        Ok(metadata)
    }

    fn save_batch(
        &self,
        txn: &mut Transaction<'_>,
        batch: &[EntityChange],
        revision: RevisionNumber,
    ) -> Result<Vec<RevisionId<EntityId>>> {
        // Prior state is whatever was committed before this revision
        let prior = self.prior_state(self.db.as_ref(), batch.iter().map(EntityChange::id), revision);
        let mut rows = DecomposedRows::default();
        let keys = batch
            .iter()
            .map(|change| self.decompose(&prior, change, revision, &mut rows))
            .collect::<Result<Vec<_>>>()?;
        self.write(txn, rows)?;
        Ok(keys)
    }

    /// One insert round per log, even when a log has no rows
    fn write(&self, txn: &mut Transaction<'_>, rows: DecomposedRows) -> Result<()> {
        self.entities.insert_all(txn, rows.spine)?;
        self.properties.insert_all(txn, rows.properties)?;
        self.references.insert_all(txn, rows.references)?;
        Ok(())
    }

    fn decompose(
        &self,
        prior: &PriorState,
        change: &EntityChange,
        revision: RevisionNumber,
        rows: &mut DecomposedRows,
    ) -> Result<RevisionId<EntityId>> {
        let id = change.id();
        let kind = change.kind();
        let key = RevisionId::new(id.clone(), revision);

        let (properties, references) = match change.entity() {
            Some(entity) => (entity.properties.to_rows(id)?, entity.references.to_rows(id)?),
            None => (Vec::new(), Vec::new()),
        };

        rows.properties.extend(attribute_rows(
            properties,
            prior.properties.get(id),
            kind,
            revision,
        ));
        rows.references.extend(attribute_rows(
            references,
            prior.references.get(id),
            kind,
            revision,
        ));
        rows.spine.push((
            key.clone(),
            SpineEntry::new(kind, change.entity().map(|e| e.snapshot.clone().normalized())),
        ));
        Ok(key)
    }

    /// Live attribute value instances of `entities` just before `revision`
    ///
    /// A single entity scans only its own rows; a batch scans each log once.
    fn prior_state<'e>(
        &self,
        view: &impl ReadView,
        entities: impl IntoIterator<Item = &'e EntityId>,
        revision: RevisionNumber,
    ) -> PriorState {
        let Some(previous) = revision.as_u64().checked_sub(1).map(RevisionNumber::new) else {
            return PriorState::default();
        };
        let entities: BTreeSet<&EntityId> = entities.into_iter().collect();
        PriorState {
            properties: live_before(&self.properties, view, &entities, previous),
            references: live_before(&self.references, view, &entities, previous),
        }
    }

    fn populate(&self, view: &impl ReadView, id: &RevisionId<EntityId>, entry: SpineEntry) -> EntityRevision {
        if entry.snapshot.is_none() {
            return populate::populate(id, entry, Vec::new(), Vec::new());
        }
        let properties = self.properties.entries_up_to(view, id);
        let references = self.references.entries_up_to(view, id);
        populate::populate(id, entry, properties, references)
    }
}

fn require_insert_mode(mode: SaveMode) -> Result<()> {
    match mode {
        SaveMode::Insert => Ok(()),
        other => Err(Error::unsupported(format!(
            "save mode {:?} on versioned entity repository",
            other
        ))),
    }
}

/// Attribute value instances of `entities` live at `revision`, from one scan
fn live_before<V>(
    log: &AttributeRevisionLog<V>,
    view: &impl ReadView,
    entities: &BTreeSet<&EntityId>,
    revision: RevisionNumber,
) -> BTreeMap<EntityId, BTreeSet<AttributeValueId>>
where
    V: Clone + Send + Sync + 'static,
{
    let mut grouped: BTreeMap<EntityId, Vec<AttributeRow<V>>> = BTreeMap::new();
    for (key, entry) in log.query(view, prior_scope(entities, revision)) {
        if entities.contains(&key.id.entity_id) {
            grouped
                .entry(key.id.entity_id.clone())
                .or_default()
                .push((key, entry));
        }
    }
    grouped
        .into_iter()
        .map(|(entity, rows)| {
            let live = populate::live_instances(&entity, revision, rows);
            (entity, live)
        })
        .collect()
}

/// Scan bounds for the rows of `entities` at or before `revision`
fn prior_scope<V>(
    entities: &BTreeSet<&EntityId>,
    revision: RevisionNumber,
) -> BoxedPredicate<RevisionId<AttributeValueId>, AttributeEntry<V>> {
    match entities.iter().next() {
        Some(entity) if entities.len() == 1 => Box::new(AttributeValuesAtOrBefore::new(&RevisionId::new(
            (*entity).clone(),
            revision,
        ))),
        _ => Box::new(RevisionAtMost(revision)),
    }
}

/// Value rows for `values` plus tombstones for live instances not among them
fn attribute_rows<V>(
    values: Vec<(AttributeValueId, V)>,
    live: Option<&BTreeSet<AttributeValueId>>,
    kind: RevisionKind,
    revision: RevisionNumber,
) -> Vec<AttributeRow<V>> {
    let written: BTreeSet<&AttributeValueId> = values.iter().map(|(id, _)| id).collect();
    let removed: Vec<AttributeValueId> = live
        .into_iter()
        .flatten()
        .filter(|id| !written.contains(id))
        .cloned()
        .collect();

    let mut rows: Vec<AttributeRow<V>> = values
        .into_iter()
        .map(|(id, value)| (RevisionId::new(id, revision), AttributeEntry::value(kind, value)))
        .collect();
    rows.extend(
        removed
            .into_iter()
            .map(|id| (RevisionId::new(id, revision), AttributeEntry::tombstone())),
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use revstore_core::{Entity, MatchAll, SqlParam};
    use uuid::Uuid;

    fn repository() -> VersionedEntityRepository {
        VersionedEntityRepository::with_defaults(Arc::new(Database::new())).unwrap()
    }

    fn concept(instance: u128) -> EntityId {
        EntityId::new(Uuid::from_u128(1), "Concept", Uuid::from_u128(instance))
    }

    #[test]
    fn test_non_insert_mode_is_refused_before_writing() {
        let repo = repository();
        let actor = Actor::new("admin");
        let change = EntityChange::Insert(Entity::new(concept(1)));

        for mode in [SaveMode::Update, SaveMode::Upsert] {
            let mut txn = repo.database().begin();
            let err = repo
                .save(&mut txn, change.clone(), mode, &WriteOptions::new(), &actor)
                .unwrap_err();
            assert!(matches!(err, Error::UnsupportedOperation(_)));
        }
        let err = repo
            .save_all(vec![change], SaveMode::Update, &WriteOptions::new(), &actor)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));

        assert_eq!(repo.sequencer().current(), RevisionNumber::new(1));
        assert!(repo.entity_log().table().is_empty());
        assert!(repo.metadata().table().is_empty());
    }

    #[test]
    fn test_delete_is_refused() {
        let repo = repository();
        let id = RevisionId::new(concept(1), RevisionNumber::new(1));
        let err = repo.delete(&id, &WriteOptions::new(), &Actor::new("admin")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }

    #[test]
    fn test_foreign_transaction_is_refused() {
        let repo = repository();
        let other = Database::new();
        let mut txn = other.begin();
        let err = repo
            .save(
                &mut txn,
                EntityChange::Insert(Entity::new(concept(1))),
                SaveMode::Insert,
                &WriteOptions::new(),
                &Actor::new("admin"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_supplied_revision_without_metadata_is_invariant_violation() {
        let repo = repository();
        let options = WriteOptions::new().with_revision(RevisionNumber::new(77));
        let mut txn = repo.database().begin();
        let err = repo
            .save(
                &mut txn,
                EntityChange::Insert(Entity::new(concept(1))),
                SaveMode::Insert,
                &options,
                &Actor::new("admin"),
            )
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_staged_save_is_visible_to_its_transaction_only() {
        let repo = repository();
        let mut txn = repo.database().begin();
        let key = repo
            .save(
                &mut txn,
                EntityChange::Insert(Entity::new(concept(1)).with_code("c1")),
                SaveMode::Insert,
                &WriteOptions::new(),
                &Actor::new("admin"),
            )
            .unwrap();

        assert!(repo.exists(&txn, &key));
        assert!(!repo.exists(repo.database().as_ref(), &key));
        assert_eq!(repo.count(&txn, Box::new(MatchAll)), 1);

        txn.commit().unwrap();
        let entity = repo.get(repo.database().as_ref(), &key).unwrap().entity.unwrap();
        assert_eq!(entity.snapshot.code.as_deref(), Some("c1"));
    }

    #[test]
    fn test_single_entity_prior_scan_is_scoped_to_that_entity() {
        let one = concept(1);
        let two = concept(2);
        let revision = RevisionNumber::new(4);

        let single: BTreeSet<&EntityId> = [&one].into_iter().collect();
        let filter = prior_scope::<PropertyValue>(&single, revision).sql();
        assert!(filter.template().contains("instance_id = ?"));
        assert!(filter.params().contains(&SqlParam::Uuid(one.instance_id)));
        assert!(filter.params().contains(&SqlParam::Int(4)));

        let batch: BTreeSet<&EntityId> = [&one, &two].into_iter().collect();
        let filter = prior_scope::<PropertyValue>(&batch, revision).sql();
        assert_eq!(filter.template(), "revision <= ?");
    }

    #[test]
    fn test_save_tombstones_only_its_own_entity() {
        let repo = repository();
        let actor = Actor::new("admin");
        let save = |entity: Entity| {
            repo.database()
                .transaction(|txn| {
                    repo.save(txn, EntityChange::Update(entity), SaveMode::Insert, &WriteOptions::new(), &actor)
                })
                .unwrap()
        };

        save(Entity::new(concept(1)).with_property("label", PropertyValue::plain("one")));
        save(Entity::new(concept(2)).with_property("label", PropertyValue::plain("two")));
        let key = save(Entity::new(concept(1)));

        // One tombstone for the dropped label of concept 1, nothing for concept 2
        assert_eq!(repo.property_log().table().len(), 3);
        let db = repo.database().as_ref();
        assert!(repo.get(db, &key).unwrap().entity.unwrap().properties.is_empty());
        let (_, other) = repo.get_as_of(db, &concept(2), key.revision).unwrap();
        assert_eq!(other.entity.unwrap().properties.get("label"), &[PropertyValue::plain("two")]);
    }

    #[test]
    fn test_attribute_rows_tombstone_missing_instances() {
        let entity = concept(1);
        let kept = AttributeValueId::new(entity.clone(), "label", 0);
        let dropped = AttributeValueId::new(entity.clone(), "label", 1);
        let live: BTreeSet<_> = [kept.clone(), dropped.clone()].into_iter().collect();

        let rows = attribute_rows(
            vec![(kept.clone(), PropertyValue::plain("x"))],
            Some(&live),
            RevisionKind::Update,
            RevisionNumber::new(5),
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0.id, kept);
        assert!(!rows[0].1.is_tombstone());
        assert_eq!(rows[1].0.id, dropped);
        assert!(rows[1].1.is_tombstone());
    }
}
