//! Contract types for API stability
//!
//! This module contains the types that define the store's public contract:
//!
//! 1. **Revisioned**: every row of every log is keyed by `RevisionId<K>`
//! 2. **Attributed**: every revision has exactly one `RevisionMetadata` record
//! 3. **Append-only**: rows are tagged with a `RevisionKind`, never rewritten
//!
//! ## Module Structure
//!
//! - `revision`: revision numbers, ids, kinds and metadata
//! - `options`: save modes and write options

pub mod options;
pub mod revision;

// Re-exports
pub use options::{SaveMode, WriteOptions};
pub use revision::{RevisionId, RevisionKind, RevisionMetadata, RevisionNumber};
