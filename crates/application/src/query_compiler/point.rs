use std::collections::BTreeMap;

use recordgate_core::{AppError, AppResult};
use recordgate_domain::{
    ENABLED_FIELD, EntityInstance, FieldCorrespondence, FieldMapping, GrantScanQuery, MappingScope,
    Operation, PlanCondition, PolicyType, QueryValue,
};
use serde_json::Value;

use super::plans::SubPlanBuilder;
use super::{GRANT_ALIAS, GrantQueryCompiler};

impl GrantQueryCompiler {
    pub(super) fn compile_point(
        &self,
        policy: &PolicyType,
        subject: Option<&EntityInstance>,
        target: Option<&EntityInstance>,
        operation: Operation,
    ) -> AppResult<Option<GrantScanQuery>> {
        if let Some(subject) = subject
            && subject.entity_type() != policy.subject_entity_type()
        {
            return Err(AppError::Validation(format!(
                "subject entity kind '{}' does not match policy type '{}' subject kind '{}'",
                subject.entity_type(),
                policy.id(),
                policy.subject_entity_type(),
            )));
        }

        if let Some(target) = target
            && target.entity_type() != policy.target_entity_type()
        {
            return Err(AppError::Validation(format!(
                "target entity kind '{}' does not match policy type '{}' target kind '{}'",
                target.entity_type(),
                policy.id(),
                policy.target_entity_type(),
            )));
        }

        let Some(mappings) = self.mappings_for(policy)? else {
            return Ok(None);
        };

        let mut builder = self.grant_builder(policy, operation, GRANT_ALIAS)?;

        if let Some(subject) = subject {
            self.embed_scope(&mut builder, policy, &mappings, MappingScope::Subject, subject)?;
        }

        if let Some(target) = target {
            self.embed_scope(&mut builder, policy, &mappings, MappingScope::Target, target)?;
        }

        Ok(Some(GrantScanQuery {
            grant: builder.build(),
            limit: None,
        }))
    }

    /// Embeds one concrete instance's field values as literal conditions:
    /// conjunction within a delta's join keys, disjunction across deltas and
    /// across grant fields.
    ///
    /// A supplied scope that contributes no usable value must never fall
    /// through to "all records match": the query is forced empty through a
    /// contradictory pair of conditions on the enabled flag.
    fn embed_scope(
        &self,
        builder: &mut SubPlanBuilder,
        policy: &PolicyType,
        mappings: &[FieldMapping],
        scope: MappingScope,
        instance: &EntityInstance,
    ) -> AppResult<()> {
        let field_map = match scope {
            MappingScope::Subject => policy.subject_field_names(),
            MappingScope::Target => policy.target_field_names(),
            MappingScope::GrantRecord => return Ok(()),
        };

        let mut field_groups = Vec::new();
        for mapping in mappings {
            let pairs = mapping.shared_pairs(scope);
            if pairs.is_empty() {
                continue;
            }

            let Some(entity_field) = field_map.get(mapping.grant_field()) else {
                continue;
            };

            for delta in self.instance_deltas(scope, policy, entity_field, instance, &pairs) {
                let mut conjunction = Vec::new();
                let mut complete = true;
                for (grant_side, scope_side) in &pairs {
                    let value = delta
                        .get(scope_side.property.as_str())
                        .and_then(QueryValue::from_json);
                    match value {
                        Some(value) => conjunction.push(PlanCondition::equals(
                            builder
                                .column_ref(grant_side.table.as_str(), grant_side.column.as_str()),
                            value,
                        )),
                        None => {
                            // A delta missing any join-key property is not a
                            // partial match candidate.
                            complete = false;
                            break;
                        }
                    }
                }

                if complete && !conjunction.is_empty() {
                    field_groups.push(PlanCondition::All(conjunction));
                }
            }
        }

        if field_groups.is_empty() {
            let enabled = self.builtin_column(builder, ENABLED_FIELD)?;
            builder.add_condition(PlanCondition::equals(
                enabled.clone(),
                QueryValue::Boolean(true),
            ));
            builder.add_condition(PlanCondition::equals(enabled, QueryValue::Boolean(false)));
        } else {
            builder.add_condition(PlanCondition::Any(field_groups));
        }

        Ok(())
    }

    /// Returns the instance's deltas for one mapped field, augmented with
    /// the synthesized anonymous/authenticated pseudo-role when the field is
    /// the principal roles field.
    fn instance_deltas(
        &self,
        scope: MappingScope,
        policy: &PolicyType,
        entity_field: &str,
        instance: &EntityInstance,
        pairs: &[(&FieldCorrespondence, &FieldCorrespondence)],
    ) -> Vec<BTreeMap<String, Value>> {
        let mut deltas = instance
            .field(entity_field)
            .map(|values| values.deltas().to_vec())
            .unwrap_or_default();

        let principal = self.config.principal();
        if scope == MappingScope::Subject
            && policy.subject_entity_type() == principal.entity_type()
            && entity_field == principal.roles_field()
            && let Some(id) = instance.id()
        {
            let role = Value::String(principal.synthesized_role(id).to_owned());
            let mut synthesized = BTreeMap::new();
            for (_, scope_side) in pairs {
                synthesized.insert(scope_side.property.clone(), role.clone());
            }
            deltas.push(synthesized);
        }

        deltas
    }
}
