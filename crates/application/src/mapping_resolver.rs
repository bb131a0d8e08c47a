use std::sync::Arc;

use recordgate_core::{AppError, AppResult, EntityTypeId};
use recordgate_domain::{
    FieldCorrespondence, FieldMapping, FieldStorageShape, MappingScope, PolicyType,
};

use crate::{EngineConfig, SchemaCatalog};

/// Resolves a policy type's field maps into column-level correspondences.
///
/// Grant-record, subject and target fields are declared independently and
/// are not guaranteed to share a storage shape; the resolver reconciles the
/// three shapes into join keys (`mapped_name`) the compilers can match on.
#[derive(Clone)]
pub struct MappingResolver {
    catalog: Arc<dyn SchemaCatalog>,
    config: EngineConfig,
}

impl MappingResolver {
    /// Creates a resolver from a schema catalog and engine configuration.
    #[must_use]
    pub fn new(catalog: Arc<dyn SchemaCatalog>, config: EngineConfig) -> Self {
        Self { catalog, config }
    }

    /// Returns one mapping per grant-record field mapped on both sides.
    ///
    /// A policy type with an empty subject or target field map yields the
    /// empty set. Two independently composite shapes sharing no property
    /// name are a configuration error.
    pub fn resolve(&self, policy: &PolicyType) -> AppResult<Vec<FieldMapping>> {
        if !policy.has_complete_field_maps() {
            return Ok(Vec::new());
        }

        let mut mappings = Vec::new();
        for (grant_field, subject_field, target_field) in policy.mapped_grant_fields() {
            let grant_shape = self
                .catalog
                .field_storage_shape(self.config.grant_entity_type(), grant_field)?;

            let mut correspondences = self.grant_correspondences(grant_field, &grant_shape)?;
            correspondences.extend(self.scope_correspondences(
                MappingScope::Subject,
                policy.subject_entity_type(),
                subject_field,
                grant_field,
                &grant_shape,
                policy,
            )?);
            correspondences.extend(self.scope_correspondences(
                MappingScope::Target,
                policy.target_entity_type(),
                target_field,
                grant_field,
                &grant_shape,
                policy,
            )?);

            let mapping = FieldMapping::new(grant_field, correspondences);
            if mapping.shared_pairs(MappingScope::Subject).is_empty()
                && mapping.shared_pairs(MappingScope::Target).is_empty()
            {
                continue;
            }

            mappings.push(mapping);
        }

        Ok(mappings)
    }

    fn grant_correspondences(
        &self,
        grant_field: &str,
        grant_shape: &FieldStorageShape,
    ) -> AppResult<Vec<FieldCorrespondence>> {
        let table = self.table_for(self.config.grant_entity_type(), grant_shape)?;

        if grant_shape.is_composite() {
            return Ok(grant_shape
                .columns()
                .iter()
                .map(|(property, column)| FieldCorrespondence {
                    scope: MappingScope::GrantRecord,
                    table: table.clone(),
                    column: column.clone(),
                    property: property.clone(),
                    mapped_name: format!("{grant_field}__{property}"),
                })
                .collect());
        }

        Ok(vec![FieldCorrespondence {
            scope: MappingScope::GrantRecord,
            table,
            column: grant_shape.main_column().to_owned(),
            property: grant_shape.main_property().to_owned(),
            mapped_name: grant_field.to_owned(),
        }])
    }

    fn scope_correspondences(
        &self,
        scope: MappingScope,
        entity_type: &EntityTypeId,
        field_name: &str,
        grant_field: &str,
        grant_shape: &FieldStorageShape,
        policy: &PolicyType,
    ) -> AppResult<Vec<FieldCorrespondence>> {
        let shape = self.catalog.field_storage_shape(entity_type, field_name)?;
        let table = self.table_for(entity_type, &shape)?;

        if shape.is_composite() && grant_shape.is_composite() {
            // Independently declared composite shapes must agree by property
            // name, 1:1; silently dropping the field would widen nothing but
            // hide a broken configuration.
            let shared: Vec<FieldCorrespondence> = shape
                .columns()
                .iter()
                .filter(|(property, _)| grant_shape.column_for(property).is_some())
                .map(|(property, column)| FieldCorrespondence {
                    scope,
                    table: table.clone(),
                    column: column.clone(),
                    property: property.clone(),
                    mapped_name: format!("{grant_field}__{property}"),
                })
                .collect();

            if shared.is_empty() {
                return Err(AppError::Validation(format!(
                    "policy type '{}': {} field '{field_name}' and grant field '{grant_field}' \
                     are both composite but share no property name",
                    policy.id(),
                    scope.as_str(),
                )));
            }

            return Ok(shared);
        }

        // A scalar side collapses to one correspondence; facing a composite
        // grant field it binds to the grant field's main property, and a
        // composite side facing a scalar grant field contributes only its
        // main property.
        let mapped_name = if grant_shape.is_composite() {
            format!("{grant_field}__{}", grant_shape.main_property())
        } else {
            grant_field.to_owned()
        };

        Ok(vec![FieldCorrespondence {
            scope,
            table,
            column: shape.main_column().to_owned(),
            property: shape.main_property().to_owned(),
            mapped_name,
        }])
    }

    fn table_for(
        &self,
        entity_type: &EntityTypeId,
        shape: &FieldStorageShape,
    ) -> AppResult<String> {
        match shape.dedicated_table() {
            Some(table) => Ok(table.to_owned()),
            None => self.catalog.data_table(entity_type),
        }
    }
}
