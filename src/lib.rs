//! revstore - embedded versioned entity store
//!
//! Every change to an entity is appended under a revision number; nothing is
//! overwritten. Any entity can be read back exactly as it stood at any
//! revision.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use revstore::{
//!     Actor, Database, Entity, EntityChange, EntityId, PropertyValue, SaveMode,
//!     VersionedEntityRepository, WriteOptions,
//! };
//!
//! let repo = VersionedEntityRepository::with_defaults(Arc::new(Database::new()))?;
//! let id = EntityId::new(uuid::Uuid::new_v4(), "Concept", uuid::Uuid::new_v4());
//!
//! let key = repo.database().transaction(|txn| {
//!     let entity = Entity::new(id.clone()).with_property("label", PropertyValue::new("en", "Cat"));
//!     repo.save(txn, EntityChange::Insert(entity), SaveMode::Insert, &WriteOptions::new(), &Actor::new("alice"))
//! })?;
//!
//! let (_, revision) = repo.get_as_of(repo.database().as_ref(), &id, key.revision)?;
//! assert!(revision.entity.is_some());
//! # Ok::<(), revstore::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `revstore-core`: identifiers, revision contract types, entity model,
//!   predicates and the error type
//! - `revstore-storage`: in-memory tables with transactions, sequences and
//!   paged cursors
//! - `revstore-engine`: the revision sequencer, metadata store, the three
//!   revision logs and [`VersionedEntityRepository`]

pub use revstore_core::*;
pub use revstore_engine::*;
pub use revstore_storage::{
    Database, ReadView, RowCursor, Sequence, Table, Transaction, TransactionStatus, TxnId,
};
