//! As-of reconstruction
//!
//! Rebuilds an entity from rows already fetched from the three logs. Nothing
//! here touches storage, so the rules can be tested on plain vectors.
//!
//! ## Rules
//!
//! 1. Only attribute rows of the entity with `revision <= R` count
//! 2. Rows are grouped by attribute value id
//! 3. Each group resolves to its row with the greatest revision
//! 4. Groups resolving to a tombstone are dropped; the rest are re-keyed by
//!    attribute name in discriminator order
//! 5. A spine row without a snapshot reconstructs to an absent entity
//!
//! Every save writes the entity's full value set at its revision, so when
//! populating a spine row only groups whose latest row carries that same
//! revision belong to it. An older row that was never tombstoned (a bulk
//! write landing below a revision committed meanwhile) is dropped as well.

use std::collections::{BTreeMap, BTreeSet};

use revstore_core::{
    AttributeEntry, AttributeMap, AttributeValueId, Entity, EntityId, EntityRevision,
    PropertyValue, ReferenceValue, RevisionId, RevisionNumber, SpineEntry,
};

/// Row of an attribute log
pub type AttributeRow<V> = (RevisionId<AttributeValueId>, AttributeEntry<V>);

/// Latest row per attribute value instance of `entity` at `revision`
///
/// Tombstones are kept, so callers can tell "removed" from "never written".
pub fn latest_entries<V>(
    entity: &EntityId,
    revision: RevisionNumber,
    rows: impl IntoIterator<Item = AttributeRow<V>>,
) -> BTreeMap<AttributeValueId, (RevisionNumber, AttributeEntry<V>)> {
    let mut latest: BTreeMap<AttributeValueId, (RevisionNumber, AttributeEntry<V>)> = BTreeMap::new();
    for (key, entry) in rows {
        if key.revision > revision || &key.id.entity_id != entity {
            continue;
        }
        let newer = latest
            .get(&key.id)
            .map_or(true, |(seen, _)| key.revision > *seen);
        if newer {
            latest.insert(key.id, (key.revision, entry));
        }
    }
    latest
}

/// Attribute values of `entity` visible at `revision`
pub fn visible_values<V: Clone + PartialEq>(
    entity: &EntityId,
    revision: RevisionNumber,
    rows: impl IntoIterator<Item = AttributeRow<V>>,
) -> AttributeMap<V> {
    AttributeMap::from_rows(
        latest_entries(entity, revision, rows)
            .into_iter()
            .filter_map(|(id, (_, entry))| entry.value.map(|value| (id, value))),
    )
}

/// Attribute values saved together with the spine row of `entity` at `revision`
pub fn saved_values<V: Clone + PartialEq>(
    entity: &EntityId,
    revision: RevisionNumber,
    rows: impl IntoIterator<Item = AttributeRow<V>>,
) -> AttributeMap<V> {
    AttributeMap::from_rows(
        latest_entries(entity, revision, rows)
            .into_iter()
            .filter(|(_, (seen, _))| *seen == revision)
            .filter_map(|(id, (_, entry))| entry.value.map(|value| (id, value))),
    )
}

/// Attribute value instances of `entity` that are live at `revision`
pub fn live_instances<V>(
    entity: &EntityId,
    revision: RevisionNumber,
    rows: impl IntoIterator<Item = AttributeRow<V>>,
) -> BTreeSet<AttributeValueId> {
    latest_entries(entity, revision, rows)
        .into_iter()
        .filter(|(_, (_, entry))| !entry.is_tombstone())
        .map(|(id, _)| id)
        .collect()
}

/// Reconstruct the entity of spine row `id`
pub fn populate(
    id: &RevisionId<EntityId>,
    spine: SpineEntry,
    properties: impl IntoIterator<Item = AttributeRow<PropertyValue>>,
    references: impl IntoIterator<Item = AttributeRow<ReferenceValue>>,
) -> EntityRevision {
    let Some(snapshot) = spine.snapshot else {
        return EntityRevision {
            kind: spine.kind,
            entity: None,
        };
    };

    let mut entity = Entity::from_snapshot(snapshot);
    entity.properties = saved_values(&id.id, id.revision, properties);
    entity.references = saved_values(&id.id, id.revision, references);
    EntityRevision {
        kind: spine.kind,
        entity: Some(entity),
    }
}
