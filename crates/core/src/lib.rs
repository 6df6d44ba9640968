//! Core types and traits for revstore
//!
//! This crate defines the foundational types used throughout the system:
//! - EntityId / AttributeValueId: composite identities of entities and attribute value instances
//! - Actor: the user a write is attributed to
//! - Contract types: RevisionNumber, RevisionId, RevisionKind, RevisionMetadata, SaveMode, WriteOptions
//! - Entity model: Entity, EntitySnapshot, AttributeMap, PropertyValue, ReferenceValue,
//!   EntityChange, SpineEntry, AttributeEntry, EntityRevision
//! - Predicate: composable row filters with SQL rendering
//! - Error: error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod contract;
pub mod entity;
pub mod error;
pub mod predicate;
pub mod types;

// Re-export commonly used types and traits
pub use error::{Error, Result};
pub use types::{Actor, AttributeValueId, EntityId};

pub use contract::{
    RevisionId, RevisionKind, RevisionMetadata, RevisionNumber, SaveMode, WriteOptions,
};

pub use entity::{
    AttributeEntry, AttributeMap, Entity, EntityChange, EntityRevision, EntitySnapshot,
    PropertyValue, ReferenceValue, SpineEntry,
};

pub use predicate::{And, BoxedPredicate, MatchAll, MatchNone, Or, Predicate, SqlFilter, SqlParam};
