use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use recordgate_core::{AppError, AppResult, EntityId, EntityTypeId};
use recordgate_domain::{
    EntityInstance, FieldStorageShape, FieldValues, GrantMatchQuery, GrantMatchRow, GrantScanQuery,
    Operation, PolicyType, PolicyTypeInput,
};
use serde_json::json;

use super::{AccessDecisionService, AccessVerdict};
use crate::{
    EngineConfig, EntityLoader, GrantQueryCompiler, PolicyTypeRepository, PrincipalSettings,
    QueryBackend, SchemaCatalog,
};

struct FakeSchemaCatalog {
    shapes: HashMap<(String, String), FieldStorageShape>,
    data_tables: HashMap<String, String>,
    id_keys: HashMap<String, String>,
}

impl SchemaCatalog for FakeSchemaCatalog {
    fn field_storage_shape(
        &self,
        entity_type: &EntityTypeId,
        field_name: &str,
    ) -> AppResult<FieldStorageShape> {
        self.shapes
            .get(&(entity_type.as_str().to_owned(), field_name.to_owned()))
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "unknown field '{field_name}' on entity type '{entity_type}'"
                ))
            })
    }

    fn data_table(&self, entity_type: &EntityTypeId) -> AppResult<String> {
        self.data_tables
            .get(entity_type.as_str())
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("unknown entity type '{entity_type}'")))
    }

    fn id_key(&self, entity_type: &EntityTypeId) -> AppResult<String> {
        self.id_keys
            .get(entity_type.as_str())
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("unknown entity type '{entity_type}'")))
    }
}

struct FakePolicyTypeRepository {
    policies: Vec<PolicyType>,
}

#[async_trait]
impl PolicyTypeRepository for FakePolicyTypeRepository {
    async fn list_for_target(
        &self,
        target_entity_type: &EntityTypeId,
    ) -> AppResult<Vec<PolicyType>> {
        Ok(self
            .policies
            .iter()
            .filter(|policy| policy.target_entity_type() == target_entity_type)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct FakeQueryBackend {
    grant_ids: Vec<EntityId>,
    match_rows: Vec<GrantMatchRow>,
}

#[async_trait]
impl QueryBackend for FakeQueryBackend {
    async fn fetch_match_rows(&self, _query: &GrantMatchQuery) -> AppResult<Vec<GrantMatchRow>> {
        Ok(self.match_rows.clone())
    }

    async fn fetch_grant_ids(&self, _query: &GrantScanQuery) -> AppResult<Vec<EntityId>> {
        Ok(self.grant_ids.clone())
    }
}

struct FakeEntityLoader {
    entities: HashMap<(String, String), EntityInstance>,
}

#[async_trait]
impl EntityLoader for FakeEntityLoader {
    async fn load(
        &self,
        entity_type: &EntityTypeId,
        id: &EntityId,
    ) -> AppResult<Option<EntityInstance>> {
        Ok(self
            .entities
            .get(&(entity_type.as_str().to_owned(), id.as_str().to_owned()))
            .cloned())
    }
}

fn entity_type(name: &str) -> EntityTypeId {
    EntityTypeId::new(name).unwrap_or_else(|_| unreachable!())
}

fn entity_id(value: &str) -> EntityId {
    EntityId::new(value).unwrap_or_else(|_| unreachable!())
}

fn catalog() -> FakeSchemaCatalog {
    let mut shapes = HashMap::new();
    let mut insert = |entity: &str, field: &str, shape: FieldStorageShape| {
        shapes.insert((entity.to_owned(), field.to_owned()), shape);
    };

    let scalar_shared = |property: &str, column: &str| {
        FieldStorageShape::scalar_shared(property, column).unwrap_or_else(|_| unreachable!())
    };
    insert("access_record", "policy_type", scalar_shared("value", "policy_type"));
    insert(
        "access_record",
        "operation",
        FieldStorageShape::scalar_dedicated("access_record__operation", "value", "operation_value")
            .unwrap_or_else(|_| unreachable!()),
    );
    insert("access_record", "enabled", scalar_shared("value", "enabled"));
    insert("access_record", "subject_type", scalar_shared("value", "subject_type"));
    insert("access_record", "target_type", scalar_shared("value", "target_type"));
    insert(
        "access_record",
        "role",
        FieldStorageShape::scalar_dedicated("access_record__role", "value", "role_value")
            .unwrap_or_else(|_| unreachable!()),
    );
    insert("access_record", "item", scalar_shared("value", "item_ref"));
    insert(
        "user",
        "roles",
        FieldStorageShape::scalar_dedicated("user__roles", "value", "roles_target_id")
            .unwrap_or_else(|_| unreachable!()),
    );
    insert("item", "id", scalar_shared("value", "id"));

    FakeSchemaCatalog {
        shapes,
        data_tables: HashMap::from([
            ("access_record".to_owned(), "access_records".to_owned()),
            ("user".to_owned(), "users".to_owned()),
            ("item".to_owned(), "items".to_owned()),
        ]),
        id_keys: HashMap::from([
            ("access_record".to_owned(), "id".to_owned()),
            ("user".to_owned(), "uid".to_owned()),
            ("item".to_owned(), "id".to_owned()),
        ]),
    }
}

fn policy_input(id: &str) -> PolicyTypeInput {
    PolicyTypeInput {
        id: id.to_owned(),
        subject_entity_type: entity_type("user"),
        target_entity_type: entity_type("item"),
        operations: BTreeSet::from([Operation::Update]),
        field_access_enabled: false,
        field_access_fields_allowed: BTreeSet::new(),
        subject_field_names: BTreeMap::from([("role".to_owned(), "roles".to_owned())]),
        target_field_names: BTreeMap::from([("item".to_owned(), "id".to_owned())]),
    }
}

fn policy(id: &str) -> PolicyType {
    PolicyType::new(policy_input(id)).unwrap_or_else(|_| unreachable!())
}

fn service(policies: Vec<PolicyType>, backend: FakeQueryBackend) -> AccessDecisionService {
    service_with_loader(policies, backend, HashMap::new())
}

fn service_with_loader(
    policies: Vec<PolicyType>,
    backend: FakeQueryBackend,
    entities: HashMap<(String, String), EntityInstance>,
) -> AccessDecisionService {
    let principal = PrincipalSettings::new(
        entity_type("user"),
        "roles",
        entity_id("0"),
        "anonymous",
        "authenticated",
    )
    .unwrap_or_else(|_| unreachable!());
    let compiler = GrantQueryCompiler::new(
        Arc::new(catalog()),
        EngineConfig::new(entity_type("access_record"), principal),
    );

    AccessDecisionService::new(
        Arc::new(FakePolicyTypeRepository { policies }),
        Arc::new(backend),
        Arc::new(FakeEntityLoader { entities }),
        compiler,
    )
}

fn subject(id: Option<&str>) -> EntityInstance {
    let fields = BTreeMap::from([(
        "roles".to_owned(),
        FieldValues::scalars("value", vec![json!("editor")]),
    )]);
    EntityInstance::new(entity_type("user"), id.map(entity_id), fields)
}

fn target(id: &str) -> EntityInstance {
    let fields = BTreeMap::from([("id".to_owned(), FieldValues::single("value", json!(id)))]);
    EntityInstance::new(entity_type("item"), Some(entity_id(id)), fields)
}

#[tokio::test]
async fn neutral_when_no_policy_type_applies() {
    let service = service(Vec::new(), FakeQueryBackend::default());

    let decision = service
        .decide_entity_access(&target("42"), Operation::Update, &subject(Some("7")))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(decision.verdict(), AccessVerdict::Neutral);
}

#[tokio::test]
async fn neutral_when_operation_is_not_granted_by_any_type() {
    let service = service(vec![policy("editor_access")], FakeQueryBackend::default());

    let decision = service
        .decide_entity_access(&target("42"), Operation::Delete, &subject(Some("7")))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(decision.verdict(), AccessVerdict::Neutral);
}

#[tokio::test]
async fn forbidden_for_subject_without_durable_identity() {
    let backend = FakeQueryBackend {
        grant_ids: vec![entity_id("g1")],
        ..FakeQueryBackend::default()
    };
    let service = service(vec![policy("editor_access")], backend);

    let decision = service
        .decide_entity_access(&target("42"), Operation::Update, &subject(None))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(decision.verdict(), AccessVerdict::Forbidden);
}

#[tokio::test]
async fn allowed_when_a_grant_record_matches() {
    let backend = FakeQueryBackend {
        grant_ids: vec![entity_id("g1")],
        ..FakeQueryBackend::default()
    };
    let service = service(vec![policy("editor_access")], backend);

    let decision = service
        .decide_entity_access(&target("42"), Operation::Update, &subject(Some("7")))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(decision.is_allowed());
    assert!(decision.reason().contains("editor_access"));
}

#[tokio::test]
async fn forbidden_when_no_record_matches() {
    let service = service(vec![policy("editor_access")], FakeQueryBackend::default());

    let decision = service
        .decide_entity_access(&target("42"), Operation::Update, &subject(Some("7")))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(decision.verdict(), AccessVerdict::Forbidden);
}

#[tokio::test]
async fn misconfigured_types_are_skipped_not_widened() {
    let mut broken = policy_input("broken_access");
    broken.target_field_names = BTreeMap::new();
    let broken = PolicyType::new(broken).unwrap_or_else(|_| unreachable!());

    let backend = FakeQueryBackend {
        grant_ids: vec![entity_id("g1")],
        ..FakeQueryBackend::default()
    };
    let service = service(vec![broken, policy("editor_access")], backend);

    let decision = service
        .decide_entity_access(&target("42"), Operation::Update, &subject(Some("7")))
        .await
        .unwrap_or_else(|_| unreachable!());
    // The broken type compiles to no query; the second type still grants.
    assert!(decision.is_allowed());
    assert!(decision.reason().contains("editor_access"));
}

#[tokio::test]
async fn field_access_is_neutral_without_opted_in_types() {
    let backend = FakeQueryBackend {
        grant_ids: vec![entity_id("g1")],
        ..FakeQueryBackend::default()
    };
    let service = service(vec![policy("editor_access")], backend);

    let decision = service
        .decide_field_access(Operation::Update, "body", &target("42"), &subject(Some("7")))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(decision.verdict(), AccessVerdict::Neutral);
}

#[tokio::test]
async fn field_access_outside_every_allow_list_is_forbidden() {
    let mut input = policy_input("editor_access");
    input.field_access_enabled = true;
    input.field_access_fields_allowed = BTreeSet::from(["body".to_owned()]);
    let policy = PolicyType::new(input).unwrap_or_else(|_| unreachable!());

    let backend = FakeQueryBackend {
        grant_ids: vec![entity_id("g1")],
        ..FakeQueryBackend::default()
    };
    let service = service(vec![policy], backend);

    let decision = service
        .decide_field_access(
            Operation::Update,
            "summary",
            &target("42"),
            &subject(Some("7")),
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(decision.verdict(), AccessVerdict::Forbidden);
}

#[tokio::test]
async fn field_access_in_allow_list_follows_record_matching() {
    let mut input = policy_input("editor_access");
    input.field_access_enabled = true;
    input.field_access_fields_allowed = BTreeSet::from(["body".to_owned()]);
    let policy = PolicyType::new(input).unwrap_or_else(|_| unreachable!());

    let backend = FakeQueryBackend {
        grant_ids: vec![entity_id("g1")],
        ..FakeQueryBackend::default()
    };
    let service = service(vec![policy], backend);

    let decision = service
        .decide_field_access(Operation::Update, "body", &target("42"), &subject(Some("7")))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(decision.is_allowed());
}

#[tokio::test]
async fn decide_by_id_loads_the_target() {
    let backend = FakeQueryBackend {
        grant_ids: vec![entity_id("g1")],
        ..FakeQueryBackend::default()
    };
    let entities = HashMap::from([(("item".to_owned(), "42".to_owned()), target("42"))]);
    let service = service_with_loader(vec![policy("editor_access")], backend, entities);

    let decision = service
        .decide_entity_access_by_id(
            &entity_type("item"),
            &entity_id("42"),
            Operation::Update,
            &subject(Some("7")),
        )
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(decision.is_allowed());

    let missing = service
        .decide_entity_access_by_id(
            &entity_type("item"),
            &entity_id("43"),
            Operation::Update,
            &subject(Some("7")),
        )
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn any_grant_exists_requires_a_subject_row() {
    let matched = GrantMatchRow {
        grant_id: entity_id("g1"),
        subject_id: Some(entity_id("7")),
        target_id: None,
    };
    let unmatched = GrantMatchRow {
        grant_id: entity_id("g2"),
        subject_id: None,
        target_id: None,
    };
    let backend = FakeQueryBackend {
        match_rows: vec![unmatched.clone(), matched],
        ..FakeQueryBackend::default()
    };
    {
        let service = service(vec![policy("editor_access")], backend);

        let exists = service
            .any_grant_exists(&policy("editor_access"), &entity_id("7"), Operation::Update)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(exists);
    }

    let backend = FakeQueryBackend {
        match_rows: vec![unmatched],
        ..FakeQueryBackend::default()
    };
    let service = service(vec![policy("editor_access")], backend);
    let exists = service
        .any_grant_exists(&policy("editor_access"), &entity_id("7"), Operation::Update)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(!exists);
}
