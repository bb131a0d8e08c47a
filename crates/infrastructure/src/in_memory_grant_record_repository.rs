use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use recordgate_application::{EngineConfig, GrantPair, GrantRecordRepository, SchemaCatalog};
use recordgate_core::{AppError, AppResult, EntityId};
use recordgate_domain::{
    ENABLED_FIELD, ENTITY_REF_COLUMN, FieldStorageShape, GrantRecord, OPERATION_FIELD,
    POLICY_TYPE_FIELD, PolicyType, SUBJECT_TYPE_FIELD, TARGET_TYPE_FIELD,
};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::{InMemoryDatabase, TableRow};

/// In-memory grant record repository.
///
/// Persists records per (policy type, pair) and projects every save into
/// the shared row store, laid out exactly as the schema catalog describes
/// grant storage, so compiled queries observe the saved records.
pub struct InMemoryGrantRecordRepository {
    database: Arc<InMemoryDatabase>,
    catalog: Arc<dyn SchemaCatalog>,
    config: EngineConfig,
    policies: HashMap<String, PolicyType>,
    records: Mutex<HashMap<(String, String), GrantRecord>>,
    next_id: AtomicU64,
}

impl InMemoryGrantRecordRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new(
        database: Arc<InMemoryDatabase>,
        catalog: Arc<dyn SchemaCatalog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            database,
            catalog,
            config,
            policies: HashMap::new(),
            records: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a policy type whose records this repository may persist.
    #[must_use]
    pub fn with_policy(mut self, policy: PolicyType) -> Self {
        self.policies
            .insert(policy.id().as_str().to_owned(), policy);
        self
    }

    fn policy_for(&self, policy_type_id: &str) -> AppResult<&PolicyType> {
        self.policies.get(policy_type_id).ok_or_else(|| {
            AppError::Validation(format!(
                "no policy type '{policy_type_id}' is registered with the grant repository"
            ))
        })
    }

    /// Rewrites the stored rows of one grant record.
    fn project(&self, record: &GrantRecord, id: &EntityId, policy: &PolicyType) -> AppResult<()> {
        let grant_type = self.config.grant_entity_type();
        let base_table = self.catalog.data_table(grant_type)?;
        let id_key = self.catalog.id_key(grant_type)?;
        let id_value = json!(id.as_str());

        self.database
            .remove_rows(base_table.as_str(), id_key.as_str(), &id_value);

        let mut base_row: TableRow = BTreeMap::from([(id_key, id_value.clone())]);

        let builtin_scalars = [
            (POLICY_TYPE_FIELD, json!(record.policy_type_id().as_str())),
            (ENABLED_FIELD, json!(record.enabled())),
            (
                SUBJECT_TYPE_FIELD,
                json!(policy.subject_entity_type().as_str()),
            ),
            (
                TARGET_TYPE_FIELD,
                json!(policy.target_entity_type().as_str()),
            ),
        ];
        for (field_name, value) in builtin_scalars {
            let shape = self.catalog.field_storage_shape(grant_type, field_name)?;
            self.write_scalar(&mut base_row, &shape, &id_value, value);
        }

        let operation_shape = self
            .catalog
            .field_storage_shape(grant_type, OPERATION_FIELD)?;
        self.clear_dedicated(&operation_shape, &id_value);
        for operation in record.operations() {
            self.write_scalar(
                &mut base_row,
                &operation_shape,
                &id_value,
                json!(operation.as_str()),
            );
        }

        for (field_name, values) in record.fields() {
            let shape = self.catalog.field_storage_shape(grant_type, field_name)?;
            self.clear_dedicated(&shape, &id_value);
            match shape.dedicated_table() {
                Some(table) => {
                    for delta in values.deltas() {
                        let mut row: TableRow =
                            BTreeMap::from([(ENTITY_REF_COLUMN.to_owned(), id_value.clone())]);
                        for (property, column) in shape.columns() {
                            if let Some(value) = delta.get(property) {
                                row.insert(column.clone(), value.clone());
                            }
                        }
                        self.database.insert_row(table, row);
                    }
                }
                None => {
                    // A shared-table field stores one delta; extra deltas
                    // would need a dedicated table.
                    if let Some(delta) = values.deltas().first() {
                        for (property, column) in shape.columns() {
                            if let Some(value) = delta.get(property) {
                                base_row.insert(column.clone(), value.clone());
                            }
                        }
                    }
                }
            }
        }

        self.database.insert_row(base_table.as_str(), base_row);
        Ok(())
    }

    fn write_scalar(
        &self,
        base_row: &mut TableRow,
        shape: &FieldStorageShape,
        id_value: &Value,
        value: Value,
    ) {
        match shape.dedicated_table() {
            Some(table) => {
                let row: TableRow = BTreeMap::from([
                    (ENTITY_REF_COLUMN.to_owned(), id_value.clone()),
                    (shape.main_column().to_owned(), value),
                ]);
                self.database.insert_row(table, row);
            }
            None => {
                base_row.insert(shape.main_column().to_owned(), value);
            }
        }
    }

    fn clear_dedicated(&self, shape: &FieldStorageShape, id_value: &Value) {
        if let Some(table) = shape.dedicated_table() {
            self.database.remove_rows(table, ENTITY_REF_COLUMN, id_value);
        }
    }
}

#[async_trait]
impl GrantRecordRepository for InMemoryGrantRecordRepository {
    async fn find_grant_for_pair(
        &self,
        policy_type_id: &str,
        pair: &GrantPair,
    ) -> AppResult<Option<GrantRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .get(&(policy_type_id.to_owned(), pair.lock_key()))
            .cloned())
    }

    async fn save_grant(&self, record: GrantRecord, pair: &GrantPair) -> AppResult<GrantRecord> {
        let policy = self.policy_for(record.policy_type_id().as_str())?;

        let record = match record.id() {
            Some(_) => record,
            None => {
                let sequence = self.next_id.fetch_add(1, Ordering::Relaxed);
                record.with_id(EntityId::new(format!("grant-{sequence}"))?)
            }
        };
        let id = record
            .id()
            .cloned()
            .ok_or_else(|| AppError::Internal("grant record id missing after assignment".to_owned()))?;

        self.project(&record, &id, policy)?;
        self.records.lock().await.insert(
            (
                record.policy_type_id().as_str().to_owned(),
                pair.lock_key(),
            ),
            record.clone(),
        );

        Ok(record)
    }
}
