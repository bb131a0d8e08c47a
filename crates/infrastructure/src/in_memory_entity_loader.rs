use std::collections::HashMap;

use async_trait::async_trait;
use recordgate_application::EntityLoader;
use recordgate_core::{AppError, AppResult, EntityId, EntityTypeId};
use recordgate_domain::EntityInstance;

/// In-memory entity loader over registered instances.
#[derive(Default)]
pub struct InMemoryEntityLoader {
    entities: HashMap<(String, String), EntityInstance>,
}

impl InMemoryEntityLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one instance; the instance must carry a durable identity.
    pub fn register(&mut self, instance: EntityInstance) -> AppResult<()> {
        let id = instance.id().ok_or_else(|| {
            AppError::Validation("cannot register an entity instance without an id".to_owned())
        })?;

        self.entities.insert(
            (
                instance.entity_type().as_str().to_owned(),
                id.as_str().to_owned(),
            ),
            instance.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl EntityLoader for InMemoryEntityLoader {
    async fn load(
        &self,
        entity_type: &EntityTypeId,
        id: &EntityId,
    ) -> AppResult<Option<EntityInstance>> {
        Ok(self
            .entities
            .get(&(entity_type.as_str().to_owned(), id.as_str().to_owned()))
            .cloned())
    }
}
