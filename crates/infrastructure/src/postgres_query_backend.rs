use async_trait::async_trait;
use recordgate_application::QueryBackend;
use recordgate_core::{AppError, AppResult, EntityId};
use recordgate_domain::{
    ENTITY_REF_COLUMN, EntitySubPlan, GrantMatchQuery, GrantMatchRow, GrantScanQuery, ID_OUTPUT,
    PlanCondition, QueryValue,
};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::debug;

/// PostgreSQL-backed query backend rendering compiled plans to SQL.
///
/// Each sub-plan becomes a grouped subquery; Set Mode left-joins the
/// subject and target subqueries onto the grant subquery. Identity and
/// text comparisons go through `::TEXT` casts so the plan model stays
/// agnostic of physical column types.
#[derive(Clone)]
pub struct PostgresQueryBackend {
    pool: PgPool,
}

impl PostgresQueryBackend {
    /// Creates a backend with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct MatchRow {
    grant_id: String,
    subject_id: Option<String>,
    target_id: Option<String>,
}

#[derive(Debug, FromRow)]
struct ScanRow {
    grant_id: String,
}

#[async_trait]
impl QueryBackend for PostgresQueryBackend {
    async fn fetch_match_rows(&self, query: &GrantMatchQuery) -> AppResult<Vec<GrantMatchRow>> {
        let mut builder = match_query_builder(query);
        debug!(sql = builder.sql(), "executing grant match query");

        let rows = builder
            .build_query_as::<MatchRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to execute grant match query: {error}"))
            })?;

        rows.into_iter()
            .map(|row| {
                Ok(GrantMatchRow {
                    grant_id: EntityId::new(row.grant_id)?,
                    subject_id: row.subject_id.map(EntityId::new).transpose()?,
                    target_id: row.target_id.map(EntityId::new).transpose()?,
                })
            })
            .collect()
    }

    async fn fetch_grant_ids(&self, query: &GrantScanQuery) -> AppResult<Vec<EntityId>> {
        let mut builder = scan_query_builder(query);
        debug!(sql = builder.sql(), "executing grant scan query");

        let rows = builder
            .build_query_as::<ScanRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to execute grant scan query: {error}"))
            })?;

        rows.into_iter()
            .map(|row| EntityId::new(row.grant_id))
            .collect()
    }
}

fn match_query_builder(query: &GrantMatchQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT ");
    builder.push(query.grant.alias.as_str());
    builder.push(".id AS grant_id, ");

    match &query.subject {
        Some(joined) => {
            builder.push(joined.plan.alias.as_str());
            builder.push(".id AS subject_id, ");
        }
        None => {
            builder.push("NULL::TEXT AS subject_id, ");
        }
    }
    match &query.target {
        Some(joined) => {
            builder.push(joined.plan.alias.as_str());
            builder.push(".id AS target_id");
        }
        None => {
            builder.push("NULL::TEXT AS target_id");
        }
    }

    builder.push(" FROM ");
    push_sub_plan(&mut builder, &query.grant);

    for joined in [query.subject.as_ref(), query.target.as_ref()]
        .into_iter()
        .flatten()
    {
        builder.push(" LEFT JOIN ");
        push_sub_plan(&mut builder, &joined.plan);
        builder.push(" ON ");
        push_condition(&mut builder, &joined.on);
    }

    builder.push(" GROUP BY 1, 2, 3 ORDER BY 1, 2, 3");
    builder
}

fn scan_query_builder(query: &GrantScanQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT ");
    builder.push(query.grant.alias.as_str());
    builder.push(".id AS grant_id FROM ");
    push_sub_plan(&mut builder, &query.grant);
    builder.push(" GROUP BY 1 ORDER BY 1");

    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }

    builder
}

/// Renders one sub-plan as a grouped subquery aliased under the plan alias.
fn push_sub_plan(builder: &mut QueryBuilder<'static, Postgres>, plan: &EntitySubPlan) {
    builder.push("(SELECT ");
    builder.push(plan.alias.as_str());
    builder.push('.');
    builder.push(plan.id_column.as_str());
    builder.push("::TEXT AS ");
    builder.push(ID_OUTPUT);

    for column in &plan.columns {
        builder.push(", ");
        builder.push(column.source.table_alias.as_str());
        builder.push('.');
        builder.push(column.source.column.as_str());
        builder.push("::TEXT AS ");
        builder.push(column.output_name.as_str());
    }

    builder.push(" FROM ");
    builder.push(plan.base_table.as_str());
    builder.push(" AS ");
    builder.push(plan.alias.as_str());

    for attachment in &plan.attachments {
        builder.push(" LEFT JOIN ");
        builder.push(attachment.table.as_str());
        builder.push(" AS ");
        builder.push(attachment.alias.as_str());
        builder.push(" ON ");
        builder.push(attachment.alias.as_str());
        builder.push('.');
        builder.push(ENTITY_REF_COLUMN);
        builder.push("::TEXT = ");
        builder.push(plan.alias.as_str());
        builder.push('.');
        builder.push(plan.id_column.as_str());
        builder.push("::TEXT");
    }

    if !plan.conditions.is_empty() {
        builder.push(" WHERE ");
        for (index, condition) in plan.conditions.iter().enumerate() {
            if index > 0 {
                builder.push(" AND ");
            }
            push_condition(builder, condition);
        }
    }

    builder.push(" GROUP BY ");
    let output_count = plan.columns.len() + 1;
    for position in 1..=output_count {
        if position > 1 {
            builder.push(", ");
        }
        builder.push(position.to_string());
    }
    builder.push(" ORDER BY ");
    for position in 1..=output_count {
        if position > 1 {
            builder.push(", ");
        }
        builder.push(position.to_string());
    }

    builder.push(") AS ");
    builder.push(plan.alias.as_str());
}

fn push_condition(builder: &mut QueryBuilder<'static, Postgres>, condition: &PlanCondition) {
    match condition {
        PlanCondition::Equals { column, value } => {
            push_comparison(builder, &column.table_alias, &column.column, "=", value);
        }
        PlanCondition::NotEquals { column, value } => {
            push_comparison(builder, &column.table_alias, &column.column, "<>", value);
        }
        PlanCondition::IsNotNull { column } => {
            builder.push(column.table_alias.as_str());
            builder.push('.');
            builder.push(column.column.as_str());
            builder.push(" IS NOT NULL");
        }
        PlanCondition::ColumnsEqual { left, right } => {
            builder.push(left.table_alias.as_str());
            builder.push('.');
            builder.push(left.column.as_str());
            builder.push("::TEXT = ");
            builder.push(right.table_alias.as_str());
            builder.push('.');
            builder.push(right.column.as_str());
            builder.push("::TEXT");
        }
        PlanCondition::All(children) => push_group(builder, children, " AND ", "TRUE"),
        PlanCondition::Any(children) => push_group(builder, children, " OR ", "FALSE"),
    }
}

fn push_group(
    builder: &mut QueryBuilder<'static, Postgres>,
    children: &[PlanCondition],
    separator: &str,
    empty: &str,
) {
    if children.is_empty() {
        builder.push(empty);
        return;
    }

    builder.push('(');
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            builder.push(separator);
        }
        push_condition(builder, child);
    }
    builder.push(')');
}

fn push_comparison(
    builder: &mut QueryBuilder<'static, Postgres>,
    table_alias: &str,
    column: &str,
    operator: &str,
    value: &QueryValue,
) {
    builder.push(table_alias);
    builder.push('.');
    builder.push(column);
    match value {
        QueryValue::Text(text) => {
            builder.push("::TEXT ");
            builder.push(operator);
            builder.push(' ');
            builder.push_bind(text.clone());
        }
        QueryValue::Integer(number) => {
            builder.push(' ');
            builder.push(operator);
            builder.push(' ');
            builder.push_bind(*number);
        }
        QueryValue::Boolean(flag) => {
            builder.push(' ');
            builder.push(operator);
            builder.push(' ');
            builder.push_bind(*flag);
        }
    }
}

#[cfg(test)]
mod tests;
