use recordgate_core::{AppResult, EntityId};
use recordgate_domain::{
    FieldMapping, GrantMatchQuery, ID_OUTPUT, JoinedSubPlan, MappingScope, Operation,
    PlanCondition, PolicyType, QualifiedColumn, QueryValue,
};

use super::{GRANT_ALIAS, GrantQueryCompiler, SUBJECT_ALIAS, TARGET_ALIAS};

impl GrantQueryCompiler {
    pub(super) fn compile_set(
        &self,
        policy: &PolicyType,
        fixed_subject_id: Option<&EntityId>,
        operation: Operation,
        join_subjects: bool,
        join_targets: bool,
    ) -> AppResult<Option<GrantMatchQuery>> {
        let Some(mappings) = self.mappings_for(policy)? else {
            return Ok(None);
        };

        let mut grant_builder = self.grant_builder(policy, operation, GRANT_ALIAS)?;
        self.project_grant_scope(&mut grant_builder, &mappings);
        let grant = grant_builder.build();

        let subject = if join_subjects {
            let plan = self.scope_plan(
                MappingScope::Subject,
                policy.subject_entity_type(),
                SUBJECT_ALIAS,
                &mappings,
                fixed_subject_id,
            )?;
            let on = self.join_condition(policy, &mappings, MappingScope::Subject, SUBJECT_ALIAS);
            Some(JoinedSubPlan { plan, on })
        } else {
            None
        };

        let target = if join_targets {
            let plan = self.scope_plan(
                MappingScope::Target,
                policy.target_entity_type(),
                TARGET_ALIAS,
                &mappings,
                None,
            )?;
            let on = self.join_condition(policy, &mappings, MappingScope::Target, TARGET_ALIAS);
            Some(JoinedSubPlan { plan, on })
        } else {
            None
        };

        Ok(Some(GrantMatchQuery {
            grant,
            subject,
            target,
        }))
    }

    /// Builds the join condition for one scope: a disjunction over grant
    /// fields of the conjunction over that field's shared join keys.
    fn join_condition(
        &self,
        policy: &PolicyType,
        mappings: &[FieldMapping],
        scope: MappingScope,
        scope_alias: &str,
    ) -> PlanCondition {
        let mut field_groups = Vec::new();
        for mapping in mappings {
            let pairs = mapping.shared_pairs(scope);
            if pairs.is_empty() {
                continue;
            }

            let conjunction = pairs
                .into_iter()
                .map(|(grant_side, scope_side)| {
                    PlanCondition::columns_equal(
                        QualifiedColumn::new(scope_alias, scope_side.output_alias()),
                        QualifiedColumn::new(GRANT_ALIAS, grant_side.output_alias()),
                    )
                })
                .collect();
            field_groups.push(PlanCondition::All(conjunction));
        }

        if scope == MappingScope::Subject {
            field_groups.extend(self.role_synthesis(policy, mappings, scope_alias));
        }

        PlanCondition::Any(field_groups)
    }

    /// Synthesizes the anonymous/authenticated pseudo-role match: membership
    /// of those roles is not stored on principal rows and must be derived
    /// from the subject's identity.
    fn role_synthesis(
        &self,
        policy: &PolicyType,
        mappings: &[FieldMapping],
        subject_alias: &str,
    ) -> Vec<PlanCondition> {
        let principal = self.config.principal();
        if policy.subject_entity_type() != principal.entity_type() {
            return Vec::new();
        }

        let mut conditions = Vec::new();
        for mapping in mappings {
            let Some(subject_field) = policy.subject_field_names().get(mapping.grant_field())
            else {
                continue;
            };
            if subject_field != principal.roles_field() {
                continue;
            }

            for (grant_side, _) in mapping.shared_pairs(MappingScope::Subject) {
                let role_column = QualifiedColumn::new(GRANT_ALIAS, grant_side.output_alias());
                let subject_id_column = QualifiedColumn::new(subject_alias, ID_OUTPUT);
                let anonymous_id = QueryValue::Text(principal.anonymous_id().as_str().to_owned());

                conditions.push(PlanCondition::All(vec![
                    PlanCondition::equals(
                        role_column.clone(),
                        QueryValue::Text(principal.anonymous_role().to_owned()),
                    ),
                    PlanCondition::equals(subject_id_column.clone(), anonymous_id.clone()),
                ]));
                conditions.push(PlanCondition::All(vec![
                    PlanCondition::equals(
                        role_column,
                        QueryValue::Text(principal.authenticated_role().to_owned()),
                    ),
                    PlanCondition::not_equals(subject_id_column, anonymous_id),
                ]));
            }
        }

        conditions
    }
}
