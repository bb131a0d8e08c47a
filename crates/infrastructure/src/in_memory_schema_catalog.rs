use std::collections::HashMap;

use recordgate_application::SchemaCatalog;
use recordgate_core::{AppError, AppResult, EntityTypeId};
use recordgate_domain::FieldStorageShape;

/// In-memory schema catalog populated through registration calls.
///
/// Stands in for the descriptors an ORM-like storage layer would provide;
/// lookups of unregistered entity kinds or fields are hard errors.
#[derive(Default)]
pub struct InMemorySchemaCatalog {
    entities: HashMap<String, EntityStorage>,
    shapes: HashMap<(String, String), FieldStorageShape>,
}

struct EntityStorage {
    data_table: String,
    id_key: String,
}

impl InMemorySchemaCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity kind with its data table and identity column.
    pub fn register_entity(
        &mut self,
        entity_type: &EntityTypeId,
        data_table: impl Into<String>,
        id_key: impl Into<String>,
    ) {
        self.entities.insert(
            entity_type.as_str().to_owned(),
            EntityStorage {
                data_table: data_table.into(),
                id_key: id_key.into(),
            },
        );
    }

    /// Registers one field's storage shape for an entity kind.
    pub fn register_field(
        &mut self,
        entity_type: &EntityTypeId,
        field_name: impl Into<String>,
        shape: FieldStorageShape,
    ) -> AppResult<()> {
        let field_name = field_name.into();
        if !self.entities.contains_key(entity_type.as_str()) {
            return Err(AppError::NotFound(format!(
                "cannot register field '{field_name}' on unknown entity type '{entity_type}'"
            )));
        }

        self.shapes
            .insert((entity_type.as_str().to_owned(), field_name), shape);
        Ok(())
    }
}

impl SchemaCatalog for InMemorySchemaCatalog {
    fn field_storage_shape(
        &self,
        entity_type: &EntityTypeId,
        field_name: &str,
    ) -> AppResult<FieldStorageShape> {
        self.shapes
            .get(&(entity_type.as_str().to_owned(), field_name.to_owned()))
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "unknown field '{field_name}' on entity type '{entity_type}'"
                ))
            })
    }

    fn data_table(&self, entity_type: &EntityTypeId) -> AppResult<String> {
        self.entities
            .get(entity_type.as_str())
            .map(|entity| entity.data_table.clone())
            .ok_or_else(|| AppError::NotFound(format!("unknown entity type '{entity_type}'")))
    }

    fn id_key(&self, entity_type: &EntityTypeId) -> AppResult<String> {
        self.entities
            .get(entity_type.as_str())
            .map(|entity| entity.id_key.clone())
            .ok_or_else(|| AppError::NotFound(format!("unknown entity type '{entity_type}'")))
    }
}
