//! Revision engine for revstore
//!
//! This crate builds the versioned entity store on top of the storage layer:
//! - RevisionSequencer: revision numbers from a locked allocation record
//! - RevisionMetadataStore: who made each revision and when
//! - RevisionLog: append-only spine and attribute logs
//! - populate: as-of reconstruction from fetched rows
//! - VersionedEntityRepository: the write and read paths over all of the above
//! - RevstoreConfig: settings from `revstore.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod log;
pub mod metadata;
pub mod populate;
pub mod predicates;
pub mod repository;
pub mod sequencer;

pub use config::{RevstoreConfig, CONFIG_FILE_NAME};
pub use log::{AttributeRevisionLog, EntityRevisionLog, RevisionLog};
pub use metadata::RevisionMetadataStore;
pub use predicates::{
    AttributeValuesAtOrBefore, ContainerIs, EntityIdIs, EntityScoped, KindIs, RevisionAtMost,
};
pub use repository::{SpinePredicate, VersionedEntityRepository};
pub use sequencer::RevisionSequencer;
