//! Revision identifier types
//!
//! Every change to the store happens at a revision. Revision numbers are
//! allocated from one store-wide sequence, so they are comparable across
//! entities: revision 12 happened after revision 11 no matter which
//! entities either touched.
//!
//! ## Types
//!
//! - **RevisionNumber**: globally monotonic 64-bit revision number
//! - **RevisionId<K>**: a key of some log (`K`) at a revision
//! - **RevisionKind**: what a spine row means (insert, update, delete)
//! - **RevisionMetadata**: who made a revision and when

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-wide revision number
///
/// ## Invariants
///
/// - Allocated once per save call, never reused
/// - Strictly increasing in allocation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionNumber(u64);

impl RevisionNumber {
    /// Smallest representable revision
    pub const MIN: RevisionNumber = RevisionNumber(0);

    /// Largest representable revision, useful as an "as of now" bound
    pub const MAX: RevisionNumber = RevisionNumber(u64::MAX);

    /// Create a revision number
    pub const fn new(n: u64) -> Self {
        RevisionNumber(n)
    }

    /// Get the numeric value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The following revision number (saturating)
    pub const fn next(&self) -> Self {
        RevisionNumber(self.0.saturating_add(1))
    }
}

impl From<u64> for RevisionNumber {
    fn from(n: u64) -> Self {
        RevisionNumber(n)
    }
}

impl fmt::Display for RevisionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A log key at a specific revision
///
/// `RevisionId<EntityId>` addresses one spine row,
/// `RevisionId<AttributeValueId>` one attribute row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionId<K> {
    /// Key within the log
    pub id: K,
    /// Revision of the row
    pub revision: RevisionNumber,
}

impl<K> RevisionId<K> {
    /// Create a revision id
    pub fn new(id: K, revision: RevisionNumber) -> Self {
        Self { id, revision }
    }

    /// Borrow the key
    pub fn id(&self) -> &K {
        &self.id
    }

    /// Revision of the row
    pub fn revision(&self) -> RevisionNumber {
        self.revision
    }
}

// Orders by revision first, then key, so ordered storage iterates rows in
// revision order.
impl<K: Ord> Ord for RevisionId<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.revision
            .cmp(&other.revision)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl<K: Ord> PartialOrd for RevisionId<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: fmt::Display> fmt::Display for RevisionId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.revision)
    }
}

/// Meaning of a spine or attribute row
///
/// Stored as its upper-case name (`INSERT`, `UPDATE`, `DELETE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RevisionKind {
    /// Entity created
    Insert,
    /// Entity changed
    Update,
    /// Entity removed
    Delete,
}

impl RevisionKind {
    /// Stored name of the kind
    pub const fn as_str(&self) -> &'static str {
        match self {
            RevisionKind::Insert => "INSERT",
            RevisionKind::Update => "UPDATE",
            RevisionKind::Delete => "DELETE",
        }
    }

    /// Parse a stored kind name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(RevisionKind::Insert),
            "UPDATE" => Some(RevisionKind::Update),
            "DELETE" => Some(RevisionKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for RevisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMetadata {
    /// Revision number
    pub number: RevisionNumber,
    /// Username of the author
    pub author: String,
    /// When the revision was made
    pub timestamp: DateTime<Utc>,
}

impl RevisionMetadata {
    /// Create a metadata record
    pub fn new(number: RevisionNumber, author: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            number,
            author: author.into(),
            timestamp,
        }
    }
}
