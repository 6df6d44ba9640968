//! Bulk save tests
//!
//! Validates that `save_all`:
//! - writes one insert round per log per batch
//! - stamps every entity of the call with one shared revision
//! - keeps earlier batches when a later batch fails

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use revstore_core::{
    Actor, Entity, EntityChange, EntityId, Error, MatchAll, PropertyValue, RevisionId,
    RevisionNumber, SaveMode, WriteOptions,
};
use revstore_engine::{RevstoreConfig, VersionedEntityRepository};
use revstore_storage::Database;
use uuid::Uuid;

fn concept(instance: u128) -> EntityId {
    EntityId::new(Uuid::from_u128(7), "Concept", Uuid::from_u128(instance))
}

fn repository(batch_size: usize) -> VersionedEntityRepository {
    let config = RevstoreConfig::default().with_batch_size(batch_size);
    VersionedEntityRepository::new(Arc::new(Database::new()), config).unwrap()
}

fn labelled(instance: u128) -> EntityChange {
    EntityChange::Insert(
        Entity::new(concept(instance))
            .with_property("label", PropertyValue::new("en", format!("concept {}", instance)))
            .with_reference("broader", concept(0)),
    )
}

fn with_labels(instance: u128, labels: &[&str]) -> Entity {
    labels
        .iter()
        .fold(Entity::new(concept(instance)), |e, l| e.with_property("label", PropertyValue::plain(*l)))
}

fn save_now(repo: &VersionedEntityRepository, entity: Entity) -> RevisionId<EntityId> {
    repo.database()
        .transaction(|txn| {
            repo.save(
                txn,
                EntityChange::Update(entity),
                SaveMode::Insert,
                &WriteOptions::new(),
                &Actor::new("editor"),
            )
        })
        .unwrap()
}

fn labels_at(repo: &VersionedEntityRepository, key: &RevisionId<EntityId>) -> Vec<PropertyValue> {
    let db = repo.database().as_ref();
    repo.get(db, key)
        .unwrap()
        .entity
        .unwrap()
        .properties
        .get("label")
        .to_vec()
}

#[test]
fn test_batch_coherence() {
    let repo = repository(5000);
    let actor = Actor::new("importer");

    let keys = repo
        .save_all((1..=12_000).map(labelled), SaveMode::Insert, &WriteOptions::new(), &actor)
        .unwrap();

    assert_eq!(keys.len(), 12_000);
    let revisions: HashSet<RevisionNumber> = keys.iter().map(|k| k.revision).collect();
    assert_eq!(revisions.len(), 1);

    assert_eq!(repo.entity_log().table().insert_rounds(), 3);
    assert_eq!(repo.property_log().table().insert_rounds(), 3);
    assert_eq!(repo.reference_log().table().insert_rounds(), 3);

    assert_eq!(repo.entity_log().table().len(), 12_000);
    assert_eq!(repo.property_log().table().len(), 12_000);
    assert_eq!(repo.reference_log().table().len(), 12_000);
    assert_eq!(repo.metadata().table().len(), 1);
    assert!(repo.metadata().exists(repo.database().as_ref(), keys[0].revision));
}

#[test]
fn test_keys_follow_input_order() {
    let repo = repository(3);
    let keys = repo
        .save_all((1..=7).map(labelled), SaveMode::Insert, &WriteOptions::new(), &Actor::new("importer"))
        .unwrap();
    let ids: Vec<EntityId> = keys.into_iter().map(|k| k.id).collect();
    assert_eq!(ids, (1..=7).map(concept).collect::<Vec<_>>());
}

#[test]
fn test_empty_batch_round_still_counts() {
    let repo = repository(2);
    let changes = (1..=3).map(|i| EntityChange::Insert(Entity::new(concept(i))));
    repo.save_all(changes, SaveMode::Insert, &WriteOptions::new(), &Actor::new("importer"))
        .unwrap();

    assert_eq!(repo.entity_log().table().insert_rounds(), 2);
    assert_eq!(repo.property_log().table().insert_rounds(), 2);
    assert!(repo.property_log().table().is_empty());
}

#[test]
fn test_failed_batch_keeps_earlier_batches() {
    let repo = repository(2);
    let changes = vec![labelled(1), labelled(2), labelled(3), labelled(3), labelled(4)];

    let err = repo
        .save_all(changes, SaveMode::Insert, &WriteOptions::new(), &Actor::new("importer"))
        .unwrap_err();

    match &err {
        Error::BatchAborted { committed, source } => {
            assert_eq!(*committed, 2);
            assert!(matches!(**source, Error::DuplicateKey { .. }));
        }
        other => panic!("expected BatchAborted, got {:?}", other),
    }

    let db = repo.database().as_ref();
    assert_eq!(repo.count(db, Box::new(MatchAll)), 2);
    assert_eq!(repo.property_log().table().len(), 2);
    // The rejected second batch staged nothing and the third never ran
    assert_eq!(repo.entity_log().table().insert_rounds(), 1);
    assert_eq!(repo.property_log().table().insert_rounds(), 1);
}

#[test]
fn test_supplied_revision_is_shared() {
    let repo = repository(10);
    let actor = Actor::new("importer");

    let first = repo
        .save_all(vec![labelled(1)], SaveMode::Insert, &WriteOptions::new(), &actor)
        .unwrap();
    let options = WriteOptions::new().with_revision(first[0].revision);
    let second = repo
        .save_all(vec![labelled(2)], SaveMode::Insert, &options, &actor)
        .unwrap();

    assert_eq!(second[0].revision, first[0].revision);
    assert_eq!(repo.metadata().table().len(), 1);

    let unknown = WriteOptions::new().with_revision(RevisionNumber::new(999));
    let err = repo
        .save_all(vec![labelled(3)], SaveMode::Insert, &unknown, &actor)
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
}

#[test]
fn test_bulk_rewrite_tombstones_dropped_values() {
    let repo = repository(4);
    let actor = Actor::new("importer");
    repo.save_all((1..=6).map(labelled), SaveMode::Insert, &WriteOptions::new(), &actor)
        .unwrap();

    // Rewrite every entity without its reference
    let rewrites = (1..=6).map(|i| {
        EntityChange::Update(
            Entity::new(concept(i)).with_property("label", PropertyValue::new("en", format!("concept {}", i))),
        )
    });
    let keys = repo
        .save_all(rewrites, SaveMode::Insert, &WriteOptions::new(), &actor)
        .unwrap();

    let db = repo.database().as_ref();
    for key in &keys {
        let entity = repo.get(db, key).unwrap().entity.unwrap();
        assert!(entity.references.is_empty());
        assert_eq!(entity.properties.len(), 1);
    }
    // 6 references plus 6 tombstones
    assert_eq!(repo.reference_log().table().len(), 12);
}

#[test]
fn test_save_committed_during_bulk_write_keeps_its_state() {
    let repo = repository(10);
    save_now(&repo, with_labels(1, &["a"]));

    // The bulk revision is allocated before the input is pulled, so this
    // save commits a later revision before the bulk rows land
    let later = RefCell::new(None);
    let changes = std::iter::once(()).map(|_| {
        *later.borrow_mut() = Some(save_now(&repo, with_labels(1, &["a"])));
        EntityChange::Update(with_labels(1, &["a", "b"]))
    });
    let bulk = repo
        .save_all(changes, SaveMode::Insert, &WriteOptions::new(), &Actor::new("importer"))
        .unwrap();
    let later = later.into_inner().unwrap();

    assert!(bulk[0].revision < later.revision);
    assert_eq!(labels_at(&repo, &bulk[0]), vec![PropertyValue::plain("a"), PropertyValue::plain("b")]);
    assert_eq!(labels_at(&repo, &later), vec![PropertyValue::plain("a")]);

    let db = repo.database().as_ref();
    let (key, revision) = repo.get_as_of(db, &concept(1), later.revision).unwrap();
    assert_eq!(key, later);
    assert_eq!(revision.entity.unwrap().properties.get("label"), &[PropertyValue::plain("a")]);
}
