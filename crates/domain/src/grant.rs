use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use recordgate_core::{AppError, AppResult, EntityId, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::{FieldValues, Operation};

/// Built-in grant-record field discriminating the owning policy type.
pub const POLICY_TYPE_FIELD: &str = "policy_type";
/// Built-in repeatable grant-record field carrying granted operations.
pub const OPERATION_FIELD: &str = "operation";
/// Built-in grant-record field gating participation in matching.
pub const ENABLED_FIELD: &str = "enabled";
/// Built-in grant-record field naming the subject entity kind.
pub const SUBJECT_TYPE_FIELD: &str = "subject_type";
/// Built-in grant-record field naming the target entity kind.
pub const TARGET_TYPE_FIELD: &str = "target_type";

/// One authorization instance belonging to a policy type.
///
/// A record participates in matching only while `enabled` is set and its
/// policy type and entity kinds match the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRecord {
    id: Option<EntityId>,
    policy_type_id: NonEmptyString,
    operations: BTreeSet<Operation>,
    enabled: bool,
    fields: BTreeMap<String, FieldValues>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GrantRecord {
    /// Creates a new, not yet persisted grant record.
    pub fn new(
        policy_type_id: impl Into<String>,
        operations: BTreeSet<Operation>,
        enabled: bool,
        fields: BTreeMap<String, FieldValues>,
    ) -> AppResult<Self> {
        if operations.is_empty() {
            return Err(AppError::Validation(
                "grant record requires at least one operation".to_owned(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: None,
            policy_type_id: NonEmptyString::new(policy_type_id)?,
            operations,
            enabled,
            fields,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns the persisted identity, when the record has been saved.
    #[must_use]
    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    /// Returns a copy carrying the repository-assigned identity.
    #[must_use]
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns the owning policy type identifier.
    #[must_use]
    pub fn policy_type_id(&self) -> &NonEmptyString {
        &self.policy_type_id
    }

    /// Returns the granted operations.
    #[must_use]
    pub fn operations(&self) -> &BTreeSet<Operation> {
        &self.operations
    }

    /// Returns whether the record participates in matching.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the mapped field payloads.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValues> {
        &self.fields
    }

    /// Returns the values of one mapped field, when present.
    #[must_use]
    pub fn field(&self, field_name: &str) -> Option<&FieldValues> {
        self.fields.get(field_name)
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last mutation timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replaces operations, enabled flag and field payloads in one mutation.
    pub fn apply_update(
        &mut self,
        operations: BTreeSet<Operation>,
        enabled: bool,
        fields: BTreeMap<String, FieldValues>,
    ) -> AppResult<()> {
        if operations.is_empty() {
            return Err(AppError::Validation(
                "grant record requires at least one operation".to_owned(),
            ));
        }

        self.operations = operations;
        self.enabled = enabled;
        self.fields = fields;
        self.updated_at = Utc::now();
        Ok(())
    }
}
