//! Domain entities and invariants of the access-record matching engine.

#![forbid(unsafe_code)]

mod entity;
mod grant;
mod mapping;
mod operation;
mod policy;
mod query;
mod schema;

pub use entity::{EntityInstance, FieldValues};
pub use grant::{
    ENABLED_FIELD, GrantRecord, OPERATION_FIELD, POLICY_TYPE_FIELD, SUBJECT_TYPE_FIELD,
    TARGET_TYPE_FIELD,
};
pub use mapping::{FieldCorrespondence, FieldMapping, MappingScope};
pub use operation::Operation;
pub use policy::{PolicyType, PolicyTypeInput};
pub use query::{
    EntitySubPlan, GrantMatchQuery, GrantMatchRow, GrantScanQuery, ID_OUTPUT, JoinedSubPlan,
    PlanCondition, ProjectedColumn, QualifiedColumn, QueryValue, TableAttachment,
};
pub use schema::{ENTITY_REF_COLUMN, FieldStorageShape};
