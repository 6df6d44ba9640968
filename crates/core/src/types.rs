//! Core identifier types for revstore
//!
//! This module defines the foundational types:
//! - EntityId: Composite key (container / kind / instance) of a versionable entity
//! - AttributeValueId: One instance of a multi-valued attribute of an entity
//! - Actor: The user on whose behalf a write is performed

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one versionable entity
///
/// An entity lives in a container (for example a graph or a vocabulary),
/// has a kind (its type within the container) and an instance id unique
/// within that kind.
///
/// Ordering is container → kind → instance, which keeps entities of one
/// container adjacent in ordered storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    /// Container the entity belongs to
    pub container_id: Uuid,
    /// Kind of the entity within its container
    pub kind_id: String,
    /// Instance identifier
    pub instance_id: Uuid,
}

impl EntityId {
    /// Create an entity id from its three components
    pub fn new(container_id: Uuid, kind_id: impl Into<String>, instance_id: Uuid) -> Self {
        Self {
            container_id,
            kind_id: kind_id.into(),
            instance_id,
        }
    }

    /// Create an entity id with a random instance id
    pub fn random(container_id: Uuid, kind_id: impl Into<String>) -> Self {
        Self::new(container_id, kind_id, Uuid::new_v4())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.container_id, self.kind_id, self.instance_id
        )
    }
}

/// Identity of one instance of a multi-valued attribute
///
/// An attribute such as `label` can carry several values on one entity
/// (one per language, for example). Each value is addressed by its
/// position within the attribute's value list, so the pair
/// `(attribute, index)` is stable for as long as the list keeps its order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeValueId {
    /// Entity owning the attribute
    pub entity_id: EntityId,
    /// Attribute name
    pub attribute: String,
    /// Zero-based position of the value within the attribute
    pub index: u32,
}

impl AttributeValueId {
    /// Create an attribute value id
    pub fn new(entity_id: EntityId, attribute: impl Into<String>, index: u32) -> Self {
        Self {
            entity_id,
            attribute: attribute.into(),
            index,
        }
    }
}

impl fmt::Display for AttributeValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}[{}]", self.entity_id, self.attribute, self.index)
    }
}

/// The user a write is attributed to
///
/// Authentication and permissions are handled outside the store; the store
/// only records the username as the author of each revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    username: String,
}

impl Actor {
    /// Create an actor
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    /// Username recorded as revision author
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}
