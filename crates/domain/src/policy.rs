use std::collections::{BTreeMap, BTreeSet};

use recordgate_core::{AppError, AppResult, EntityTypeId, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::Operation;

/// Input payload for policy type construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyTypeInput {
    /// Unique machine identifier.
    pub id: String,
    /// Entity kind of matching subjects.
    pub subject_entity_type: EntityTypeId,
    /// Entity kind this policy type grants access to.
    pub target_entity_type: EntityTypeId,
    /// Operations this type is allowed to grant.
    pub operations: BTreeSet<Operation>,
    /// Whether field-level checks may consult this type.
    pub field_access_enabled: bool,
    /// Target field names field-level checks may additionally authorize.
    pub field_access_fields_allowed: BTreeSet<String>,
    /// Grant-record field name to subject field name map.
    pub subject_field_names: BTreeMap<String, String>,
    /// Grant-record field name to target field name map.
    pub target_field_names: BTreeMap<String, String>,
}

/// Configuration describing which fields correlate a subject, a target and
/// a grant record, and which operations it may authorize.
///
/// Immutable at evaluation time. A type with an empty subject or target
/// field map is constructible but misconfigured: it must never produce a
/// query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyType {
    id: NonEmptyString,
    subject_entity_type: EntityTypeId,
    target_entity_type: EntityTypeId,
    operations: BTreeSet<Operation>,
    field_access_enabled: bool,
    field_access_fields_allowed: BTreeSet<String>,
    subject_field_names: BTreeMap<String, String>,
    target_field_names: BTreeMap<String, String>,
}

impl PolicyType {
    /// Creates a validated policy type.
    pub fn new(input: PolicyTypeInput) -> AppResult<Self> {
        if input.operations.is_empty() {
            return Err(AppError::Validation(
                "policy type requires at least one operation".to_owned(),
            ));
        }

        validate_field_map("subject", &input.subject_field_names)?;
        validate_field_map("target", &input.target_field_names)?;

        for field_name in &input.field_access_fields_allowed {
            if field_name.trim().is_empty() {
                return Err(AppError::Validation(
                    "field access allow-list entries must not be empty".to_owned(),
                ));
            }
        }

        Ok(Self {
            id: NonEmptyString::new(input.id)?,
            subject_entity_type: input.subject_entity_type,
            target_entity_type: input.target_entity_type,
            operations: input.operations,
            field_access_enabled: input.field_access_enabled,
            field_access_fields_allowed: input.field_access_fields_allowed,
            subject_field_names: input.subject_field_names,
            target_field_names: input.target_field_names,
        })
    }

    /// Returns the unique machine identifier.
    #[must_use]
    pub fn id(&self) -> &NonEmptyString {
        &self.id
    }

    /// Returns the subject entity kind.
    #[must_use]
    pub fn subject_entity_type(&self) -> &EntityTypeId {
        &self.subject_entity_type
    }

    /// Returns the target entity kind.
    #[must_use]
    pub fn target_entity_type(&self) -> &EntityTypeId {
        &self.target_entity_type
    }

    /// Returns the operations this type may grant.
    #[must_use]
    pub fn operations(&self) -> &BTreeSet<Operation> {
        &self.operations
    }

    /// Returns whether the type may grant the operation.
    #[must_use]
    pub fn allows_operation(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    /// Returns whether field-level checks may consult this type.
    #[must_use]
    pub fn field_access_enabled(&self) -> bool {
        self.field_access_enabled
    }

    /// Returns whether field-level checks of this type may authorize the field.
    #[must_use]
    pub fn allows_field_access(&self, field_name: &str) -> bool {
        self.field_access_enabled && self.field_access_fields_allowed.contains(field_name)
    }

    /// Returns the grant-record-to-subject field name map.
    #[must_use]
    pub fn subject_field_names(&self) -> &BTreeMap<String, String> {
        &self.subject_field_names
    }

    /// Returns the grant-record-to-target field name map.
    #[must_use]
    pub fn target_field_names(&self) -> &BTreeMap<String, String> {
        &self.target_field_names
    }

    /// Returns whether both field maps carry at least one entry.
    #[must_use]
    pub fn has_complete_field_maps(&self) -> bool {
        !self.subject_field_names.is_empty() && !self.target_field_names.is_empty()
    }

    /// Returns `(grant field, subject field, target field)` triples for every
    /// grant-record field mapped on both sides.
    #[must_use]
    pub fn mapped_grant_fields(&self) -> Vec<(&str, &str, &str)> {
        self.subject_field_names
            .iter()
            .filter_map(|(grant_field, subject_field)| {
                self.target_field_names
                    .get(grant_field)
                    .map(|target_field| {
                        (
                            grant_field.as_str(),
                            subject_field.as_str(),
                            target_field.as_str(),
                        )
                    })
            })
            .collect()
    }
}

fn validate_field_map(side: &str, field_map: &BTreeMap<String, String>) -> AppResult<()> {
    for (grant_field, mapped_field) in field_map {
        if grant_field.trim().is_empty() || mapped_field.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "{side} field map entries must not be empty"
            )));
        }
    }

    Ok(())
}
