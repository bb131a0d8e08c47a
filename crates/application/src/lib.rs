//! Application services and ports of the access-record matching engine.

#![forbid(unsafe_code)]

mod access_service;
mod config;
mod grant_sync_service;
mod mapping_resolver;
mod ports;
mod query_compiler;

pub use access_service::{AccessDecision, AccessDecisionService, AccessVerdict};
pub use config::{EngineConfig, PrincipalSettings};
pub use grant_sync_service::{GrantSyncRequest, GrantSyncService, LockRetryPolicy};
pub use mapping_resolver::MappingResolver;
pub use ports::{
    EntityLoader, GrantPair, GrantRecordRepository, PolicyTypeRepository, QueryBackend, RecordLock,
    RecordLockService, SchemaCatalog,
};
pub use query_compiler::GrantQueryCompiler;
