//! Concurrent revision allocation tests
//!
//! Many threads saving at once must each get a distinct revision number
//! with exactly one metadata row behind it.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use revstore_core::{Actor, Entity, EntityChange, EntityId, PropertyValue, SaveMode, WriteOptions};
use revstore_engine::VersionedEntityRepository;
use revstore_storage::Database;
use uuid::Uuid;

const THREADS: usize = 8;
const SAVES_PER_THREAD: usize = 25;

// ============================================================================
// Helper Functions
// ============================================================================

fn shared_repository() -> Arc<VersionedEntityRepository> {
    Arc::new(VersionedEntityRepository::with_defaults(Arc::new(Database::new())).unwrap())
}

fn entity(thread: usize, n: usize) -> EntityId {
    EntityId::new(
        Uuid::from_u128(3),
        "Term",
        Uuid::from_u128(((thread as u128) << 32) | n as u128),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_concurrent_saves_get_distinct_revisions() {
    let repo = shared_repository();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let repo = Arc::clone(&repo);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let actor = Actor::new(format!("writer-{}", t));
                barrier.wait();
                (0..SAVES_PER_THREAD)
                    .map(|n| {
                        let change = EntityChange::Insert(
                            Entity::new(entity(t, n)).with_property("label", PropertyValue::plain(format!("{}-{}", t, n))),
                        );
                        repo.database()
                            .transaction(|txn| repo.save(txn, change, SaveMode::Insert, &WriteOptions::new(), &actor))
                            .unwrap()
                            .revision
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for revision in handle.join().unwrap() {
            assert!(seen.insert(revision), "revision {} allocated twice", revision);
        }
    }

    assert_eq!(seen.len(), THREADS * SAVES_PER_THREAD);
    assert_eq!(repo.metadata().table().len(), THREADS * SAVES_PER_THREAD);

    let db = repo.database().as_ref();
    for revision in &seen {
        assert!(repo.metadata().exists(db, *revision));
    }
}

#[test]
fn test_metadata_author_matches_saving_thread() {
    let repo = shared_repository();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let repo = Arc::clone(&repo);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let actor = Actor::new(format!("writer-{}", t));
                barrier.wait();
                let key = repo
                    .database()
                    .transaction(|txn| {
                        repo.save(
                            txn,
                            EntityChange::Insert(Entity::new(entity(t, 0))),
                            SaveMode::Insert,
                            &WriteOptions::new(),
                            &actor,
                        )
                    })
                    .unwrap();
                (t, key)
            })
        })
        .collect();

    let db = repo.database().as_ref();
    for handle in handles {
        let (t, key) = handle.join().unwrap();
        let metadata = repo.metadata().get(db, key.revision).unwrap();
        assert_eq!(metadata.author, format!("writer-{}", t));
    }
}

#[test]
fn test_mixed_commit_and_rollback_never_collide() {
    let repo = shared_repository();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let repo = Arc::clone(&repo);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let actor = Actor::new("mixed");
                barrier.wait();
                let mut committed = Vec::new();
                for n in 0..SAVES_PER_THREAD {
                    let mut txn = repo.database().begin();
                    let key = repo
                        .save(
                            &mut txn,
                            EntityChange::Insert(Entity::new(entity(t, n))),
                            SaveMode::Insert,
                            &WriteOptions::new(),
                            &actor,
                        )
                        .unwrap();
                    if n % 2 == 0 {
                        txn.commit().unwrap();
                        committed.push(key.revision);
                    } else {
                        txn.rollback();
                    }
                }
                committed
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for revision in handle.join().unwrap() {
            assert!(seen.insert(revision));
        }
    }
    assert_eq!(repo.metadata().table().len(), seen.len());
}
