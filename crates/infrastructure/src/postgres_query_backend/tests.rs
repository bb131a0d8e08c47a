use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use recordgate_application::{EngineConfig, GrantQueryCompiler, PrincipalSettings, QueryBackend};
use recordgate_core::{EntityId, EntityTypeId};
use recordgate_domain::{
    EntityInstance, EntitySubPlan, FieldStorageShape, FieldValues, GrantMatchQuery, GrantScanQuery,
    JoinedSubPlan, Operation, PlanCondition, PolicyType, PolicyTypeInput, ProjectedColumn,
    QualifiedColumn, QueryValue, TableAttachment,
};
use serde_json::json;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::{PostgresQueryBackend, match_query_builder, scan_query_builder};
use crate::InMemorySchemaCatalog;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

fn entity_type(name: &str) -> EntityTypeId {
    EntityTypeId::new(name).unwrap_or_else(|_| unreachable!())
}

fn entity_id(value: &str) -> EntityId {
    EntityId::new(value).unwrap_or_else(|_| unreachable!())
}

fn grant_plan() -> EntitySubPlan {
    EntitySubPlan {
        alias: "grants".to_owned(),
        base_table: "access_records".to_owned(),
        id_column: "id".to_owned(),
        attachments: vec![TableAttachment {
            table: "access_record__role".to_owned(),
            alias: "grants__0".to_owned(),
        }],
        conditions: vec![
            PlanCondition::equals(
                QualifiedColumn::new("grants", "policy_type"),
                QueryValue::Text("editor_access".to_owned()),
            ),
            PlanCondition::equals(
                QualifiedColumn::new("grants", "enabled"),
                QueryValue::Boolean(true),
            ),
        ],
        columns: vec![ProjectedColumn {
            source: QualifiedColumn::new("grants__0", "role_value"),
            output_name: "grant__role".to_owned(),
        }],
    }
}

#[test]
fn scan_sql_renders_subquery_grouping_and_limit() {
    let query = GrantScanQuery {
        grant: grant_plan(),
        limit: Some(1),
    };

    let builder = scan_query_builder(&query);
    let sql = builder.sql();

    assert!(sql.contains("SELECT grants.id AS grant_id FROM (SELECT grants.id::TEXT AS id"));
    assert!(sql.contains("FROM access_records AS grants"));
    assert!(sql.contains("LEFT JOIN access_record__role AS grants__0"));
    assert!(sql.contains("grants.policy_type::TEXT = $1"));
    assert!(sql.contains("grants.enabled = $2"));
    assert!(sql.contains("GROUP BY 1, 2 ORDER BY 1, 2"));
    assert!(sql.contains("LIMIT $3"));
}

#[test]
fn match_sql_renders_left_joined_scopes() {
    let subject_plan = EntitySubPlan {
        alias: "subjects".to_owned(),
        base_table: "users".to_owned(),
        id_column: "uid".to_owned(),
        attachments: Vec::new(),
        conditions: Vec::new(),
        columns: vec![ProjectedColumn {
            source: QualifiedColumn::new("subjects", "roles_target_id"),
            output_name: "subject__role".to_owned(),
        }],
    };
    let query = GrantMatchQuery {
        grant: grant_plan(),
        subject: Some(JoinedSubPlan {
            plan: subject_plan,
            on: PlanCondition::Any(vec![PlanCondition::columns_equal(
                QualifiedColumn::new("subjects", "subject__role"),
                QualifiedColumn::new("grants", "grant__role"),
            )]),
        }),
        target: None,
    };

    let builder = match_query_builder(&query);
    let sql = builder.sql();

    assert!(sql.contains("grants.id AS grant_id"));
    assert!(sql.contains("subjects.id AS subject_id"));
    assert!(sql.contains("NULL::TEXT AS target_id"));
    assert!(sql.contains("LEFT JOIN (SELECT subjects.uid::TEXT AS id"));
    assert!(sql.contains("ON (subjects.subject__role::TEXT = grants.grant__role::TEXT)"));
    assert!(sql.contains("GROUP BY 1, 2, 3"));
}

#[test]
fn empty_disjunction_renders_as_false() {
    let mut plan = grant_plan();
    plan.conditions.push(PlanCondition::Any(Vec::new()));

    let builder = scan_query_builder(&GrantScanQuery {
        grant: plan,
        limit: None,
    });
    assert!(builder.sql().contains("FALSE"));
}

fn reference_catalog() -> InMemorySchemaCatalog {
    let mut catalog = InMemorySchemaCatalog::new();
    let access_record = entity_type("access_record");
    let user = entity_type("user");
    let item = entity_type("item");

    catalog.register_entity(&access_record, "access_records", "id");
    catalog.register_entity(&user, "users", "uid");
    catalog.register_entity(&item, "items", "id");

    let register = |catalog: &mut InMemorySchemaCatalog,
                    entity: &EntityTypeId,
                    field: &str,
                    shape: FieldStorageShape| {
        catalog
            .register_field(entity, field, shape)
            .unwrap_or_else(|_| unreachable!());
    };

    let scalar_shared = |property: &str, column: &str| {
        FieldStorageShape::scalar_shared(property, column).unwrap_or_else(|_| unreachable!())
    };
    register(
        &mut catalog,
        &access_record,
        "policy_type",
        scalar_shared("value", "policy_type"),
    );
    register(
        &mut catalog,
        &access_record,
        "operation",
        FieldStorageShape::scalar_dedicated("access_record__operation", "value", "operation_value")
            .unwrap_or_else(|_| unreachable!()),
    );
    register(
        &mut catalog,
        &access_record,
        "enabled",
        scalar_shared("value", "enabled"),
    );
    register(
        &mut catalog,
        &access_record,
        "subject_type",
        scalar_shared("value", "subject_type"),
    );
    register(
        &mut catalog,
        &access_record,
        "target_type",
        scalar_shared("value", "target_type"),
    );
    register(
        &mut catalog,
        &access_record,
        "role",
        FieldStorageShape::scalar_dedicated("access_record__role", "value", "role_value")
            .unwrap_or_else(|_| unreachable!()),
    );
    register(
        &mut catalog,
        &access_record,
        "item",
        scalar_shared("value", "item_ref"),
    );
    register(
        &mut catalog,
        &user,
        "roles",
        FieldStorageShape::scalar_dedicated("user__roles", "value", "roles_target_id")
            .unwrap_or_else(|_| unreachable!()),
    );
    register(&mut catalog, &item, "id", scalar_shared("value", "id"));

    catalog
}

fn editor_policy() -> PolicyType {
    PolicyType::new(PolicyTypeInput {
        id: "editor_access".to_owned(),
        subject_entity_type: entity_type("user"),
        target_entity_type: entity_type("item"),
        operations: BTreeSet::from([Operation::Update]),
        field_access_enabled: false,
        field_access_fields_allowed: BTreeSet::new(),
        subject_field_names: BTreeMap::from([("role".to_owned(), "roles".to_owned())]),
        target_field_names: BTreeMap::from([("item".to_owned(), "id".to_owned())]),
    })
    .unwrap_or_else(|_| unreachable!())
}

fn compiler() -> GrantQueryCompiler {
    let principal = PrincipalSettings::new(
        entity_type("user"),
        "roles",
        entity_id("0"),
        "anonymous",
        "authenticated",
    )
    .unwrap_or_else(|_| unreachable!());
    GrantQueryCompiler::new(
        Arc::new(reference_catalog()),
        EngineConfig::new(entity_type("access_record"), principal),
    )
}

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres backend tests: {error}");
    }

    Some(pool)
}

async fn seed_reference_data(pool: &PgPool) {
    for statement in [
        "DELETE FROM access_record__operation",
        "DELETE FROM access_record__role",
        "DELETE FROM access_records",
        "DELETE FROM user__roles",
        "DELETE FROM users",
        "DELETE FROM items",
        "INSERT INTO users (uid) VALUES ('7')",
        "INSERT INTO user__roles (entity_id, roles_target_id) VALUES ('7', 'editor')",
        "INSERT INTO items (id) VALUES ('42'), ('43')",
        "INSERT INTO access_records (id, policy_type, enabled, subject_type, target_type, item_ref) \
         VALUES ('g1', 'editor_access', TRUE, 'user', 'item', '42')",
        "INSERT INTO access_record__operation (entity_id, operation_value) VALUES ('g1', 'update')",
        "INSERT INTO access_record__role (entity_id, role_value) VALUES ('g1', 'editor')",
    ] {
        let result = sqlx::query(statement).execute(pool).await;
        assert!(result.is_ok(), "seed statement failed: {statement}");
    }
}

fn subject() -> EntityInstance {
    let fields = BTreeMap::from([(
        "roles".to_owned(),
        FieldValues::scalars("value", vec![json!("editor")]),
    )]);
    EntityInstance::new(entity_type("user"), Some(entity_id("7")), fields)
}

fn target(id: &str) -> EntityInstance {
    let fields = BTreeMap::from([("id".to_owned(), FieldValues::single("value", json!(id)))]);
    EntityInstance::new(entity_type("item"), Some(entity_id(id)), fields)
}

#[tokio::test]
async fn point_and_set_queries_match_the_seeded_grant() {
    let Some(pool) = test_pool().await else {
        return;
    };
    seed_reference_data(&pool).await;

    let backend = PostgresQueryBackend::new(pool);
    let compiler = compiler();
    let policy = editor_policy();

    let matching = compiler
        .compile_point_query(&policy, Some(&subject()), Some(&target("42")), Operation::Update)
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());
    let ids = backend
        .fetch_grant_ids(&matching.with_limit(1))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(ids, vec![entity_id("g1")]);

    let wrong_target = compiler
        .compile_point_query(&policy, Some(&subject()), Some(&target("43")), Operation::Update)
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());
    let ids = backend
        .fetch_grant_ids(&wrong_target.with_limit(1))
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(ids.is_empty());

    let set_query = compiler
        .compile_set_query(&policy, None, Operation::Update, true, true)
        .unwrap_or_else(|_| unreachable!())
        .unwrap_or_else(|| unreachable!());
    let rows = backend
        .fetch_match_rows(&set_query)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(rows.iter().any(|row| {
        row.grant_id == entity_id("g1")
            && row.subject_id == Some(entity_id("7"))
            && row.target_id == Some(entity_id("42"))
    }));
    assert!(!rows.iter().any(|row| row.target_id == Some(entity_id("43"))));
}
