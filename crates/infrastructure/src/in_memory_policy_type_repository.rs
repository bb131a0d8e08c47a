use async_trait::async_trait;
use recordgate_application::PolicyTypeRepository;
use recordgate_core::{AppResult, EntityTypeId};
use recordgate_domain::PolicyType;

/// In-memory policy type repository holding configured types.
pub struct InMemoryPolicyTypeRepository {
    policies: Vec<PolicyType>,
}

impl InMemoryPolicyTypeRepository {
    /// Creates a repository over a fixed set of policy types.
    #[must_use]
    pub fn new(policies: Vec<PolicyType>) -> Self {
        Self { policies }
    }
}

#[async_trait]
impl PolicyTypeRepository for InMemoryPolicyTypeRepository {
    async fn list_for_target(
        &self,
        target_entity_type: &EntityTypeId,
    ) -> AppResult<Vec<PolicyType>> {
        Ok(self
            .policies
            .iter()
            .filter(|policy| policy.target_entity_type() == target_entity_type)
            .cloned()
            .collect())
    }
}
