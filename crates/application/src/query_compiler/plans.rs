use recordgate_core::{AppResult, EntityId, EntityTypeId};
use recordgate_domain::{
    ENABLED_FIELD, EntitySubPlan, FieldMapping, MappingScope, OPERATION_FIELD, Operation,
    POLICY_TYPE_FIELD, PlanCondition, PolicyType, ProjectedColumn, QualifiedColumn, QueryValue,
    SUBJECT_TYPE_FIELD, TARGET_TYPE_FIELD, TableAttachment,
};

use super::GrantQueryCompiler;

/// Incrementally assembles one per-scope sub-plan.
///
/// Base-table columns are addressed through the sub-plan alias; dedicated
/// field tables are attached on first use and reused afterwards.
pub(super) struct SubPlanBuilder {
    alias: String,
    base_table: String,
    id_column: String,
    attachments: Vec<TableAttachment>,
    conditions: Vec<PlanCondition>,
    columns: Vec<ProjectedColumn>,
}

impl SubPlanBuilder {
    pub(super) fn new(
        alias: impl Into<String>,
        base_table: impl Into<String>,
        id_column: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            base_table: base_table.into(),
            id_column: id_column.into(),
            attachments: Vec::new(),
            conditions: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Returns a reference to a column of the base table or an attachment.
    pub(super) fn column_ref(&mut self, table: &str, column: &str) -> QualifiedColumn {
        if table == self.base_table {
            return QualifiedColumn::new(self.alias.as_str(), column);
        }

        let alias = self.attachment_alias(table);
        QualifiedColumn::new(alias, column)
    }

    fn attachment_alias(&mut self, table: &str) -> String {
        if let Some(attachment) = self
            .attachments
            .iter()
            .find(|attachment| attachment.table == table)
        {
            return attachment.alias.clone();
        }

        let alias = format!("{}__{}", self.alias, self.attachments.len());
        self.attachments.push(TableAttachment {
            table: table.to_owned(),
            alias: alias.clone(),
        });
        alias
    }

    pub(super) fn add_condition(&mut self, condition: PlanCondition) {
        self.conditions.push(condition);
    }

    pub(super) fn add_output(&mut self, source: QualifiedColumn, output_name: String) {
        self.columns.push(ProjectedColumn {
            source,
            output_name,
        });
    }

    pub(super) fn build(self) -> EntitySubPlan {
        EntitySubPlan {
            alias: self.alias,
            base_table: self.base_table,
            id_column: self.id_column,
            attachments: self.attachments,
            conditions: self.conditions,
            columns: self.columns,
        }
    }
}

impl GrantQueryCompiler {
    /// Builds the grant-record sub-plan shared by both compilation modes,
    /// filtered to the policy type, operation, enabled flag and the declared
    /// subject and target entity kinds.
    pub(super) fn grant_builder(
        &self,
        policy: &PolicyType,
        operation: Operation,
        alias: &str,
    ) -> AppResult<SubPlanBuilder> {
        let grant_type = self.config.grant_entity_type();
        let base_table = self.catalog.data_table(grant_type)?;
        let id_column = self.catalog.id_key(grant_type)?;
        let mut builder = SubPlanBuilder::new(alias, base_table, id_column);

        let filters = [
            (
                POLICY_TYPE_FIELD,
                QueryValue::Text(policy.id().as_str().to_owned()),
            ),
            (
                OPERATION_FIELD,
                QueryValue::Text(operation.as_str().to_owned()),
            ),
            (ENABLED_FIELD, QueryValue::Boolean(true)),
            (
                SUBJECT_TYPE_FIELD,
                QueryValue::Text(policy.subject_entity_type().as_str().to_owned()),
            ),
            (
                TARGET_TYPE_FIELD,
                QueryValue::Text(policy.target_entity_type().as_str().to_owned()),
            ),
        ];
        for (field_name, value) in filters {
            let column = self.builtin_column(&mut builder, field_name)?;
            builder.add_condition(PlanCondition::equals(column, value));
        }

        Ok(builder)
    }

    /// Returns the column backing a built-in grant-record field.
    pub(super) fn builtin_column(
        &self,
        builder: &mut SubPlanBuilder,
        field_name: &str,
    ) -> AppResult<QualifiedColumn> {
        let grant_type = self.config.grant_entity_type();
        let shape = self.catalog.field_storage_shape(grant_type, field_name)?;
        let table = match shape.dedicated_table() {
            Some(table) => table.to_owned(),
            None => self.catalog.data_table(grant_type)?,
        };

        Ok(builder.column_ref(table.as_str(), shape.main_column()))
    }

    /// Projects the grant scope's correspondence columns and excludes grant
    /// records lacking every matched value.
    pub(super) fn project_grant_scope(
        &self,
        builder: &mut SubPlanBuilder,
        mappings: &[FieldMapping],
    ) {
        let mut not_null = Vec::new();
        for mapping in mappings {
            for correspondence in mapping.for_scope(MappingScope::GrantRecord) {
                let column = builder.column_ref(
                    correspondence.table.as_str(),
                    correspondence.column.as_str(),
                );
                not_null.push(PlanCondition::is_not_null(column.clone()));
                builder.add_output(column, correspondence.output_alias());
            }
        }

        if !not_null.is_empty() {
            builder.add_condition(PlanCondition::Any(not_null));
        }
    }

    /// Builds the subject or target sub-plan of a Set Mode query.
    pub(super) fn scope_plan(
        &self,
        scope: MappingScope,
        entity_type: &EntityTypeId,
        alias: &str,
        mappings: &[FieldMapping],
        fixed_id: Option<&EntityId>,
    ) -> AppResult<EntitySubPlan> {
        let base_table = self.catalog.data_table(entity_type)?;
        let id_column = self.catalog.id_key(entity_type)?;
        let mut builder = SubPlanBuilder::new(alias, base_table, id_column.clone());

        if let Some(id) = fixed_id {
            builder.add_condition(PlanCondition::equals(
                QualifiedColumn::new(alias, id_column),
                QueryValue::Text(id.as_str().to_owned()),
            ));
        }

        let mut not_null = Vec::new();
        for mapping in mappings {
            for correspondence in mapping.for_scope(scope) {
                let column = builder.column_ref(
                    correspondence.table.as_str(),
                    correspondence.column.as_str(),
                );
                not_null.push(PlanCondition::is_not_null(column.clone()));
                builder.add_output(column, correspondence.output_alias());
            }
        }

        if !not_null.is_empty() {
            builder.add_condition(PlanCondition::Any(not_null));
        }

        Ok(builder.build())
    }
}
