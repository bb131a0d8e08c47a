use async_trait::async_trait;
use recordgate_core::{AppResult, EntityId, EntityTypeId};
use recordgate_domain::{
    EntityInstance, FieldStorageShape, GrantMatchQuery, GrantMatchRow, GrantRecord, GrantScanQuery,
    PolicyType,
};

/// Read-only schema descriptors supplied by the embedding storage layer.
///
/// Unknown entity kinds or fields are caller bugs and surface as hard
/// `NotFound` errors, never as recoverable runtime conditions.
pub trait SchemaCatalog: Send + Sync {
    /// Returns the storage shape of one field of one entity kind.
    fn field_storage_shape(
        &self,
        entity_type: &EntityTypeId,
        field_name: &str,
    ) -> AppResult<FieldStorageShape>;

    /// Returns the shared data table of an entity kind.
    fn data_table(&self, entity_type: &EntityTypeId) -> AppResult<String>;

    /// Returns the identity column of an entity kind's data table.
    fn id_key(&self, entity_type: &EntityTypeId) -> AppResult<String>;
}

/// Relational execution port for compiled query plans.
///
/// Implementations must support arbitrary joins, grouping and AND/OR
/// condition trees over named tables and columns, and must not apply any
/// access checking of their own: these queries are the authorization
/// primitive and must not recurse into it.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Executes a Set Mode plan and returns matching rows.
    async fn fetch_match_rows(&self, query: &GrantMatchQuery) -> AppResult<Vec<GrantMatchRow>>;

    /// Executes a Point Mode plan and returns matching grant-record ids.
    async fn fetch_grant_ids(&self, query: &GrantScanQuery) -> AppResult<Vec<EntityId>>;
}

/// Repository port for policy type configuration lookups.
#[async_trait]
pub trait PolicyTypeRepository: Send + Sync {
    /// Lists every policy type declared for a target entity kind.
    async fn list_for_target(&self, target_entity_type: &EntityTypeId)
    -> AppResult<Vec<PolicyType>>;
}

/// Entity-loading port for fetching subject or target instances by id.
#[async_trait]
pub trait EntityLoader: Send + Sync {
    /// Loads one entity instance, when it exists.
    async fn load(
        &self,
        entity_type: &EntityTypeId,
        id: &EntityId,
    ) -> AppResult<Option<EntityInstance>>;
}

/// The (subject, target) pair an automated grant mutation operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantPair {
    /// Subject entity identity.
    pub subject_id: EntityId,
    /// Target entity identity.
    pub target_id: EntityId,
}

impl GrantPair {
    /// Returns the named-lock key guarding this pair's grant record.
    #[must_use]
    pub fn lock_key(&self) -> String {
        format!("grant:{}:{}", self.subject_id, self.target_id)
    }
}

/// Repository port for grant-record read-modify-write.
#[async_trait]
pub trait GrantRecordRepository: Send + Sync {
    /// Finds the grant record maintained for a policy type and pair.
    async fn find_grant_for_pair(
        &self,
        policy_type_id: &str,
        pair: &GrantPair,
    ) -> AppResult<Option<GrantRecord>>;

    /// Persists a grant record for a pair, assigning an id on first save.
    async fn save_grant(&self, record: GrantRecord, pair: &GrantPair) -> AppResult<GrantRecord>;
}

/// A named lock held on one grant pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLock {
    /// Lock key the holder acquired.
    pub key: String,
    /// Holder token checked on release.
    pub token: String,
}

/// Named-lock port serializing automated grant mutation per pair.
#[async_trait]
pub trait RecordLockService: Send + Sync {
    /// Attempts one non-blocking acquisition of the lock.
    async fn try_acquire(&self, key: &str) -> AppResult<Option<RecordLock>>;

    /// Releases a held lock; releasing a lost lock is not an error.
    async fn release(&self, lock: &RecordLock) -> AppResult<()>;
}
