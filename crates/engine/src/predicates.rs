//! Domain predicates over log rows
//!
//! Keys of every log are `RevisionId<K>` where `K` names an entity or one of
//! its attribute values. The entity-scoped predicates here work on either,
//! through [`EntityScoped`].
//!
//! Each predicate renders to the columns of the relational layout:
//! `container_id`, `kind_id`, `instance_id`, `revision`.

use revstore_core::{
    AttributeEntry, AttributeValueId, EntityId, Predicate, RevisionId, RevisionNumber, SqlFilter,
    SqlParam,
};
use uuid::Uuid;

/// Log key that belongs to one entity
pub trait EntityScoped {
    /// Entity the key belongs to
    fn entity_id(&self) -> &EntityId;
}

impl EntityScoped for EntityId {
    fn entity_id(&self) -> &EntityId {
        self
    }
}

impl EntityScoped for AttributeValueId {
    fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }
}

fn revision_param(revision: RevisionNumber) -> SqlParam {
    SqlParam::Int(i64::try_from(revision.as_u64()).unwrap_or(i64::MAX))
}

// ===== Entity scope =====

/// Rows of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityIdIs(pub EntityId);

impl EntityIdIs {
    /// Rows of `id`
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl<K: EntityScoped, V> Predicate<RevisionId<K>, V> for EntityIdIs {
    fn test(&self, key: &RevisionId<K>, _value: &V) -> bool {
        key.id.entity_id() == &self.0
    }

    fn sql(&self) -> SqlFilter {
        SqlFilter::new(
            "container_id = ? AND kind_id = ? AND instance_id = ?",
            vec![
                SqlParam::Uuid(self.0.container_id),
                SqlParam::Text(self.0.kind_id.clone()),
                SqlParam::Uuid(self.0.instance_id),
            ],
        )
    }
}

/// Rows of entities of one kind in one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindIs {
    /// Container id
    pub container_id: Uuid,
    /// Kind id
    pub kind_id: String,
}

impl KindIs {
    /// Rows of kind `kind_id` in `container_id`
    pub fn new(container_id: Uuid, kind_id: impl Into<String>) -> Self {
        Self {
            container_id,
            kind_id: kind_id.into(),
        }
    }
}

impl<K: EntityScoped, V> Predicate<RevisionId<K>, V> for KindIs {
    fn test(&self, key: &RevisionId<K>, _value: &V) -> bool {
        let id = key.id.entity_id();
        id.container_id == self.container_id && id.kind_id == self.kind_id
    }

    fn sql(&self) -> SqlFilter {
        SqlFilter::new(
            "container_id = ? AND kind_id = ?",
            vec![
                SqlParam::Uuid(self.container_id),
                SqlParam::Text(self.kind_id.clone()),
            ],
        )
    }
}

/// Rows of entities in one container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerIs(pub Uuid);

impl<K: EntityScoped, V> Predicate<RevisionId<K>, V> for ContainerIs {
    fn test(&self, key: &RevisionId<K>, _value: &V) -> bool {
        key.id.entity_id().container_id == self.0
    }

    fn sql(&self) -> SqlFilter {
        SqlFilter::new("container_id = ?", vec![SqlParam::Uuid(self.0)])
    }
}

// ===== Revision scope =====

/// Rows at or before a revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionAtMost(pub RevisionNumber);

impl<K, V> Predicate<RevisionId<K>, V> for RevisionAtMost {
    fn test(&self, key: &RevisionId<K>, _value: &V) -> bool {
        key.revision <= self.0
    }

    fn sql(&self) -> SqlFilter {
        SqlFilter::new("revision <= ?", vec![revision_param(self.0)])
    }
}

/// Attribute rows of one entity at or before the revision of a spine key
///
/// This is the input of reconstruction: every attribute row that can
/// contribute to the entity's state at that revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValuesAtOrBefore {
    entity: EntityId,
    revision: RevisionNumber,
}

impl AttributeValuesAtOrBefore {
    /// Attribute rows contributing to the spine row `id`
    pub fn new(id: &RevisionId<EntityId>) -> Self {
        Self {
            entity: id.id.clone(),
            revision: id.revision,
        }
    }
}

impl<V> Predicate<RevisionId<AttributeValueId>, AttributeEntry<V>> for AttributeValuesAtOrBefore {
    fn test(&self, key: &RevisionId<AttributeValueId>, _value: &AttributeEntry<V>) -> bool {
        key.revision <= self.revision && key.id.entity_id == self.entity
    }

    fn sql(&self) -> SqlFilter {
        SqlFilter::new(
            "container_id = ? AND kind_id = ? AND instance_id = ? AND revision <= ?",
            vec![
                SqlParam::Uuid(self.entity.container_id),
                SqlParam::Text(self.entity.kind_id.clone()),
                SqlParam::Uuid(self.entity.instance_id),
                revision_param(self.revision),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revstore_core::{And, PropertyValue, RevisionKind, SpineEntry};

    fn entity(instance: u128) -> EntityId {
        EntityId::new(Uuid::from_u128(1), "Concept", Uuid::from_u128(instance))
    }

    fn spine_key(instance: u128, revision: u64) -> RevisionId<EntityId> {
        RevisionId::new(entity(instance), RevisionNumber::new(revision))
    }

    fn spine_value() -> SpineEntry {
        SpineEntry::new(RevisionKind::Insert, None)
    }

    #[test]
    fn test_entity_id_matches_spine_and_attribute_keys() {
        let predicate = EntityIdIs::new(entity(7));
        let spine = spine_key(7, 1);
        let attribute = RevisionId::new(AttributeValueId::new(entity(7), "label", 0), RevisionNumber::new(1));

        assert!(Predicate::<_, SpineEntry>::test(&predicate, &spine, &spine_value()));
        assert!(Predicate::<_, ()>::test(&predicate, &attribute, &()));
        assert!(!Predicate::<_, SpineEntry>::test(&predicate, &spine_key(8, 1), &spine_value()));
    }

    #[test]
    fn test_kind_and_container() {
        let key = spine_key(3, 1);
        assert!(Predicate::<_, ()>::test(&KindIs::new(Uuid::from_u128(1), "Concept"), &key, &()));
        assert!(!Predicate::<_, ()>::test(&KindIs::new(Uuid::from_u128(1), "Term"), &key, &()));
        assert!(Predicate::<_, ()>::test(&ContainerIs(Uuid::from_u128(1)), &key, &()));
        assert!(!Predicate::<_, ()>::test(&ContainerIs(Uuid::from_u128(2)), &key, &()));
    }

    #[test]
    fn test_revision_at_most_is_inclusive() {
        let predicate = RevisionAtMost(RevisionNumber::new(5));
        assert!(Predicate::<_, ()>::test(&predicate, &spine_key(1, 5), &()));
        assert!(!Predicate::<_, ()>::test(&predicate, &spine_key(1, 6), &()));
    }

    #[test]
    fn test_attribute_values_at_or_before() {
        let predicate = AttributeValuesAtOrBefore::new(&spine_key(1, 4));
        let row = AttributeEntry::value(RevisionKind::Insert, PropertyValue::plain("x"));
        let at = |instance, revision| {
            RevisionId::new(AttributeValueId::new(entity(instance), "label", 0), RevisionNumber::new(revision))
        };

        assert!(predicate.test(&at(1, 4), &row));
        assert!(predicate.test(&at(1, 1), &row));
        assert!(!predicate.test(&at(1, 5), &row));
        assert!(!predicate.test(&at(2, 4), &row));
    }

    #[test]
    fn test_sql_rendering() {
        let filter = Predicate::<RevisionId<EntityId>, ()>::sql(
            &And::<RevisionId<EntityId>, ()>::new(vec![])
                .and(ContainerIs(Uuid::from_u128(1)))
                .and(RevisionAtMost(RevisionNumber::new(9))),
        );
        assert_eq!(filter.template(), "(container_id = ? AND revision <= ?)");
        assert_eq!(
            filter.params(),
            &[SqlParam::Uuid(Uuid::from_u128(1)), SqlParam::Int(9)]
        );

        let filter = Predicate::<RevisionId<AttributeValueId>, AttributeEntry<PropertyValue>>::sql(
            &AttributeValuesAtOrBefore::new(&spine_key(2, 3)),
        );
        assert_eq!(filter.params().len(), 4);
        assert_eq!(filter.params()[3], SqlParam::Int(3));
    }
}
