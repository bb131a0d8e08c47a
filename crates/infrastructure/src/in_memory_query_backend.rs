use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use recordgate_application::QueryBackend;
use recordgate_core::{AppError, AppResult, EntityId};
use recordgate_domain::{
    ENTITY_REF_COLUMN, EntitySubPlan, GrantMatchQuery, GrantMatchRow, GrantScanQuery, ID_OUTPUT,
    JoinedSubPlan, PlanCondition, QualifiedColumn,
};
use serde_json::Value;

use crate::InMemoryDatabase;

/// Query backend evaluating compiled plans against the in-memory row store.
///
/// Matching mirrors the relational semantics the postgres backend renders:
/// null never equals anything, scalar values compare through their
/// canonical text form, sub-plans collapse duplicate projections before the
/// outer joins.
pub struct InMemoryQueryBackend {
    database: Arc<InMemoryDatabase>,
}

impl InMemoryQueryBackend {
    /// Creates a backend over a shared row store.
    #[must_use]
    pub fn new(database: Arc<InMemoryDatabase>) -> Self {
        Self { database }
    }

    /// Scans one sub-plan: attachment outer joins, condition filtering,
    /// projection and duplicate collapse.
    fn scan_sub_plan(&self, plan: &EntitySubPlan) -> Vec<BTreeMap<String, Value>> {
        let mut combined: Vec<BTreeMap<String, Value>> = self
            .database
            .rows(plan.base_table.as_str())
            .into_iter()
            .map(|row| qualify(plan.alias.as_str(), row))
            .collect();

        let base_id_key = scoped(plan.alias.as_str(), plan.id_column.as_str());
        for attachment in &plan.attachments {
            let attachment_rows = self.database.rows(attachment.table.as_str());
            let mut joined = Vec::new();
            for row in combined {
                let base_id = row.get(base_id_key.as_str());
                let matches: Vec<_> = attachment_rows
                    .iter()
                    .filter(|candidate| {
                        matches_entity_ref(candidate.get(ENTITY_REF_COLUMN), base_id)
                    })
                    .collect();

                if matches.is_empty() {
                    joined.push(row);
                    continue;
                }

                for matched in matches {
                    let mut merged = row.clone();
                    merged.extend(qualify(attachment.alias.as_str(), matched.clone()));
                    joined.push(merged);
                }
            }
            combined = joined;
        }

        combined.retain(|row| {
            plan.conditions
                .iter()
                .all(|condition| eval_condition(condition, row))
        });

        let mut seen = HashSet::new();
        let mut projected = Vec::new();
        for row in combined {
            let mut output = BTreeMap::new();
            output.insert(
                ID_OUTPUT.to_owned(),
                row.get(base_id_key.as_str()).cloned().unwrap_or(Value::Null),
            );
            for column in &plan.columns {
                let key = scoped(
                    column.source.table_alias.as_str(),
                    column.source.column.as_str(),
                );
                output.insert(
                    column.output_name.clone(),
                    row.get(key.as_str()).cloned().unwrap_or(Value::Null),
                );
            }

            let group_key = serde_json::to_string(&output).unwrap_or_default();
            if seen.insert(group_key) {
                projected.push(output);
            }
        }

        projected
    }
}

#[async_trait]
impl QueryBackend for InMemoryQueryBackend {
    async fn fetch_match_rows(&self, query: &GrantMatchQuery) -> AppResult<Vec<GrantMatchRow>> {
        let grant_rows = self.scan_sub_plan(&query.grant);
        let subject_rows = query
            .subject
            .as_ref()
            .map(|joined| (joined, self.scan_sub_plan(&joined.plan)));
        let target_rows = query
            .target
            .as_ref()
            .map(|joined| (joined, self.scan_sub_plan(&joined.plan)));

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for grant_row in &grant_rows {
            let grant_id = value_to_id(grant_row.get(ID_OUTPUT))?;
            let grant_namespace = qualify(query.grant.alias.as_str(), grant_row.clone());

            let subject_ids = match &subject_rows {
                Some((joined, scanned)) => joined_ids(&grant_namespace, joined, scanned)?,
                None => vec![None],
            };
            let target_ids = match &target_rows {
                Some((joined, scanned)) => joined_ids(&grant_namespace, joined, scanned)?,
                None => vec![None],
            };

            for subject_id in &subject_ids {
                for target_id in &target_ids {
                    let row = GrantMatchRow {
                        grant_id: grant_id.clone(),
                        subject_id: subject_id.clone(),
                        target_id: target_id.clone(),
                    };
                    let key = format!(
                        "{}|{}|{}",
                        row.grant_id,
                        row.subject_id.as_ref().map(EntityId::as_str).unwrap_or(""),
                        row.target_id.as_ref().map(EntityId::as_str).unwrap_or(""),
                    );
                    if seen.insert(key) {
                        rows.push(row);
                    }
                }
            }
        }

        Ok(rows)
    }

    async fn fetch_grant_ids(&self, query: &GrantScanQuery) -> AppResult<Vec<EntityId>> {
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        for row in self.scan_sub_plan(&query.grant) {
            let id = value_to_id(row.get(ID_OUTPUT))?;
            if seen.insert(id.as_str().to_owned()) {
                ids.push(id);
            }

            if let Some(limit) = query.limit
                && ids.len() as u64 >= limit
            {
                break;
            }
        }

        Ok(ids)
    }
}

/// Left-join semantics: every matching scope row contributes its id; a
/// grant row without any match survives with a null scope id.
fn joined_ids(
    grant_namespace: &BTreeMap<String, Value>,
    joined: &JoinedSubPlan,
    scanned: &[BTreeMap<String, Value>],
) -> AppResult<Vec<Option<EntityId>>> {
    let mut ids = Vec::new();
    for row in scanned {
        let mut merged = grant_namespace.clone();
        merged.extend(qualify(joined.plan.alias.as_str(), row.clone()));
        if eval_condition(&joined.on, &merged) {
            ids.push(Some(value_to_id(row.get(ID_OUTPUT))?));
        }
    }

    if ids.is_empty() {
        ids.push(None);
    }

    Ok(ids)
}

fn scoped(alias: &str, column: &str) -> String {
    format!("{alias}.{column}")
}

fn qualify(alias: &str, row: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    row.into_iter()
        .map(|(column, value)| (scoped(alias, column.as_str()), value))
        .collect()
}

fn matches_entity_ref(candidate: Option<&Value>, base_id: Option<&Value>) -> bool {
    match (candidate, base_id) {
        (Some(candidate), Some(base_id)) => scalar_text(candidate)
            .zip(scalar_text(base_id))
            .is_some_and(|(left, right)| left == right),
        _ => false,
    }
}

fn lookup<'row>(
    row: &'row BTreeMap<String, Value>,
    column: &QualifiedColumn,
) -> Option<&'row Value> {
    row.get(scoped(column.table_alias.as_str(), column.column.as_str()).as_str())
        .filter(|value| !value.is_null())
}

/// Canonical text form of a scalar, mirroring the `::TEXT` casts of the
/// postgres renderer. Arrays and objects never compare equal.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    scalar_text(left)
        .zip(scalar_text(right))
        .is_some_and(|(left, right)| left == right)
}

fn eval_condition(condition: &PlanCondition, row: &BTreeMap<String, Value>) -> bool {
    match condition {
        PlanCondition::Equals { column, value } => {
            lookup(row, column).is_some_and(|stored| values_equal(stored, &value.as_json()))
        }
        PlanCondition::NotEquals { column, value } => {
            lookup(row, column).is_some_and(|stored| !values_equal(stored, &value.as_json()))
        }
        PlanCondition::IsNotNull { column } => lookup(row, column).is_some(),
        PlanCondition::ColumnsEqual { left, right } => match (lookup(row, left), lookup(row, right))
        {
            (Some(left), Some(right)) => values_equal(left, right),
            _ => false,
        },
        PlanCondition::All(children) => children
            .iter()
            .all(|child| eval_condition(child, row)),
        PlanCondition::Any(children) => children
            .iter()
            .any(|child| eval_condition(child, row)),
    }
}

fn value_to_id(value: Option<&Value>) -> AppResult<EntityId> {
    let text = value.and_then(scalar_text).ok_or_else(|| {
        AppError::Internal("sub-plan projected a row without a usable id".to_owned())
    })?;
    EntityId::new(text)
}
