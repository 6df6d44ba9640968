//! Entity model
//!
//! An [`Entity`] is what callers save and read back: a scalar
//! [`EntitySnapshot`] plus two multi-valued attribute mappings, language-tagged
//! properties and references to other entities.
//!
//! Storage never keeps an `Entity` whole. The spine log keeps the snapshot as a
//! [`SpineEntry`], the attribute logs keep one [`AttributeEntry`] per attribute
//! value instance, and reads join them back into an [`EntityRevision`].

use crate::contract::RevisionKind;
use crate::error::{Error, Result};
use crate::types::{AttributeValueId, EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Language-tagged literal
///
/// An empty `lang` means the literal has no language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyValue {
    /// Language tag (for example `en`), possibly empty
    pub lang: String,
    /// Literal text
    pub value: String,
}

impl PropertyValue {
    /// Create a language-tagged literal
    pub fn new(lang: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            value: value.into(),
        }
    }

    /// Create a literal without language
    pub fn plain(value: impl Into<String>) -> Self {
        Self::new("", value)
    }
}

/// Pointer to another entity
pub type ReferenceValue = EntityId;

/// Multi-valued attribute mapping
///
/// Maps an attribute name to an ordered list of distinct values. The position
/// of a value in its list is the instance discriminator of its
/// [`AttributeValueId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMap<V> {
    values: BTreeMap<String, Vec<V>>,
}

impl<V> Default for AttributeMap<V> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<V: PartialEq> AttributeMap<V> {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value to an attribute
    ///
    /// Returns false (and leaves the mapping unchanged) if the attribute
    /// already carries an equal value.
    pub fn insert(&mut self, attribute: impl Into<String>, value: V) -> bool {
        let values = self.values.entry(attribute.into()).or_default();
        if values.contains(&value) {
            return false;
        }
        values.push(value);
        true
    }

    /// Values of one attribute, in instance order
    pub fn get(&self, attribute: &str) -> &[V] {
        self.values.get(attribute).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove an attribute and all its values
    pub fn remove(&mut self, attribute: &str) -> Vec<V> {
        self.values.remove(attribute).unwrap_or_default()
    }

    /// Attribute names carrying at least one value
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, _)| name.as_str())
    }

    /// All `(attribute, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.values
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v)))
    }

    /// Total number of values across all attributes
    pub fn len(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }

    /// True if no attribute carries a value
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into one row per value instance of `entity_id`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if an attribute holds more values than a
    /// discriminator can number.
    pub fn to_rows(&self, entity_id: &EntityId) -> Result<Vec<(AttributeValueId, V)>>
    where
        V: Clone,
    {
        let mut rows = Vec::with_capacity(self.len());
        for (name, values) in &self.values {
            for (index, value) in values.iter().enumerate() {
                rows.push((
                    AttributeValueId::new(entity_id.clone(), name.clone(), discriminator(name, index)?),
                    value.clone(),
                ));
            }
        }
        Ok(rows)
    }

    /// Rebuild a mapping from value instances
    ///
    /// Instances are placed by their discriminator, so the input order does
    /// not matter.
    pub fn from_rows(rows: impl IntoIterator<Item = (AttributeValueId, V)>) -> Self {
        let mut indexed: BTreeMap<String, BTreeMap<u32, V>> = BTreeMap::new();
        for (id, value) in rows {
            indexed.entry(id.attribute).or_default().insert(id.index, value);
        }
        Self {
            values: indexed
                .into_iter()
                .map(|(name, by_index)| (name, by_index.into_values().collect()))
                .collect(),
        }
    }
}

/// Discriminator of the value at `index` within `attribute`
pub(crate) fn discriminator(attribute: &str, index: usize) -> Result<u32> {
    u32::try_from(index).map_err(|_| {
        Error::invalid_input(format!(
            "attribute {} has more than {} values",
            attribute,
            u32::MAX
        ))
    })
}

/// Scalar projection of an entity
///
/// Business code and URI are normalized so that an empty string is stored as
/// absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity identity
    pub id: EntityId,
    /// Business code
    pub code: Option<String>,
    /// URI
    pub uri: Option<String>,
    /// Sequence number within the entity's kind
    pub number: Option<i64>,
    /// Creator username
    pub created_by: Option<String>,
    /// Creation time
    pub created_date: Option<DateTime<Utc>>,
    /// Last modifier username
    pub last_modified_by: Option<String>,
    /// Last modification time
    pub last_modified_date: Option<DateTime<Utc>>,
}

impl EntitySnapshot {
    /// Create a snapshot with only an identity
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            code: None,
            uri: None,
            number: None,
            created_by: None,
            created_date: None,
            last_modified_by: None,
            last_modified_date: None,
        }
    }

    /// Normalize empty code and URI to absent
    pub fn normalized(mut self) -> Self {
        self.code = self.code.filter(|s| !s.is_empty());
        self.uri = self.uri.filter(|s| !s.is_empty());
        self
    }
}

/// A complete entity: snapshot plus multi-valued attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Scalar fields
    pub snapshot: EntitySnapshot,
    /// Language-tagged properties
    pub properties: AttributeMap<PropertyValue>,
    /// References to other entities
    pub references: AttributeMap<ReferenceValue>,
}

impl Entity {
    /// Create an entity with no fields set
    pub fn new(id: EntityId) -> Self {
        Self::from_snapshot(EntitySnapshot::new(id))
    }

    /// Create an entity from a snapshot, with no attributes
    pub fn from_snapshot(snapshot: EntitySnapshot) -> Self {
        Self {
            snapshot,
            properties: AttributeMap::new(),
            references: AttributeMap::new(),
        }
    }

    /// Entity identity
    pub fn id(&self) -> &EntityId {
        &self.snapshot.id
    }

    /// Set the business code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.snapshot.code = Some(code.into());
        self
    }

    /// Set the URI
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.snapshot.uri = Some(uri.into());
        self
    }

    /// Set the sequence number
    pub fn with_number(mut self, number: i64) -> Self {
        self.snapshot.number = Some(number);
        self
    }

    /// Add a property value
    pub fn with_property(mut self, attribute: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(attribute, value);
        self
    }

    /// Add a reference
    pub fn with_reference(mut self, attribute: impl Into<String>, target: ReferenceValue) -> Self {
        self.references.insert(attribute, target);
        self
    }
}

/// One change submitted to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityChange {
    /// Entity created
    Insert(Entity),
    /// Entity changed; the entity is the complete new state
    Update(Entity),
    /// Entity removed
    Delete(EntityId),
}

impl EntityChange {
    /// Kind recorded in the spine for this change
    pub fn kind(&self) -> RevisionKind {
        match self {
            EntityChange::Insert(_) => RevisionKind::Insert,
            EntityChange::Update(_) => RevisionKind::Update,
            EntityChange::Delete(_) => RevisionKind::Delete,
        }
    }

    /// Identity of the changed entity
    pub fn id(&self) -> &EntityId {
        match self {
            EntityChange::Insert(entity) | EntityChange::Update(entity) => entity.id(),
            EntityChange::Delete(id) => id,
        }
    }

    /// New entity state, `None` for a removal
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            EntityChange::Insert(entity) | EntityChange::Update(entity) => Some(entity),
            EntityChange::Delete(_) => None,
        }
    }
}

/// Row value of the spine log
///
/// A `Delete` row carries no snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpineEntry {
    /// Meaning of the row
    pub kind: RevisionKind,
    /// Scalar state, absent for removals
    pub snapshot: Option<EntitySnapshot>,
}

impl SpineEntry {
    /// Create a spine row value
    pub fn new(kind: RevisionKind, snapshot: Option<EntitySnapshot>) -> Self {
        Self { kind, snapshot }
    }
}

/// Row value of an attribute log
///
/// A row with kind `Delete` and no value is a tombstone: from its revision on
/// the attribute instance is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeEntry<V> {
    /// Kind of the change that wrote this row
    pub kind: RevisionKind,
    /// Value, absent for tombstones
    pub value: Option<V>,
}

impl<V> AttributeEntry<V> {
    /// A row carrying a value
    pub fn value(kind: RevisionKind, value: V) -> Self {
        Self {
            kind,
            value: Some(value),
        }
    }

    /// A removal marker
    pub fn tombstone() -> Self {
        Self {
            kind: RevisionKind::Delete,
            value: None,
        }
    }

    /// True if this row marks removal
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// Entity state reconstructed at one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRevision {
    /// Kind of the spine row
    pub kind: RevisionKind,
    /// Reconstructed entity, absent if the row is a removal
    pub entity: Option<Entity>,
}

impl EntityRevision {
    /// True if the entity was removed at this revision
    pub fn is_removed(&self) -> bool {
        self.entity.is_none()
    }
}
