use std::collections::BTreeMap;

use recordgate_core::{EntityId, EntityTypeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered multi-value payload of one entity field.
///
/// Each delta is a property bag; scalar fields carry one property per bag,
/// composite fields carry several.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldValues(Vec<BTreeMap<String, Value>>);

impl FieldValues {
    /// Creates a payload from raw property bags.
    #[must_use]
    pub fn new(deltas: Vec<BTreeMap<String, Value>>) -> Self {
        Self(deltas)
    }

    /// Creates a single-delta payload with one property.
    #[must_use]
    pub fn single(property: impl Into<String>, value: Value) -> Self {
        Self(vec![BTreeMap::from([(property.into(), value)])])
    }

    /// Creates one delta per value, all under the same property.
    #[must_use]
    pub fn scalars(property: &str, values: Vec<Value>) -> Self {
        Self(
            values
                .into_iter()
                .map(|value| BTreeMap::from([(property.to_owned(), value)]))
                .collect(),
        )
    }

    /// Returns the ordered property bags.
    #[must_use]
    pub fn deltas(&self) -> &[BTreeMap<String, Value>] {
        self.0.as_slice()
    }

    /// Returns whether the field carries no values at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns every value stored for one property across deltas.
    #[must_use]
    pub fn property_values(&self, property: &str) -> Vec<&Value> {
        self.0
            .iter()
            .filter_map(|delta| delta.get(property))
            .collect()
    }

    /// Appends one property bag.
    pub fn push(&mut self, delta: BTreeMap<String, Value>) {
        self.0.push(delta);
    }
}

/// A loaded subject or target entity presented to the engine.
///
/// An instance without an id has no durable identity and can never satisfy
/// a record match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInstance {
    entity_type: EntityTypeId,
    id: Option<EntityId>,
    fields: BTreeMap<String, FieldValues>,
}

impl EntityInstance {
    /// Creates an entity instance projection.
    #[must_use]
    pub fn new(
        entity_type: EntityTypeId,
        id: Option<EntityId>,
        fields: BTreeMap<String, FieldValues>,
    ) -> Self {
        Self {
            entity_type,
            id,
            fields,
        }
    }

    /// Returns the entity kind.
    #[must_use]
    pub fn entity_type(&self) -> &EntityTypeId {
        &self.entity_type
    }

    /// Returns the durable identity, when the instance is persisted.
    #[must_use]
    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    /// Returns the values of one field, when present.
    #[must_use]
    pub fn field(&self, field_name: &str) -> Option<&FieldValues> {
        self.fields.get(field_name)
    }

    /// Returns all field payloads.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValues> {
        &self.fields
    }
}
