//! Infrastructure adapters for the engine's application ports.

#![forbid(unsafe_code)]

mod in_memory_database;
mod in_memory_entity_loader;
mod in_memory_grant_record_repository;
mod in_memory_policy_type_repository;
mod in_memory_query_backend;
mod in_memory_record_lock_service;
mod in_memory_schema_catalog;
mod postgres_query_backend;
mod redis_record_lock_service;

pub use in_memory_database::{InMemoryDatabase, TableRow};
pub use in_memory_entity_loader::InMemoryEntityLoader;
pub use in_memory_grant_record_repository::InMemoryGrantRecordRepository;
pub use in_memory_policy_type_repository::InMemoryPolicyTypeRepository;
pub use in_memory_query_backend::InMemoryQueryBackend;
pub use in_memory_record_lock_service::InMemoryRecordLockService;
pub use in_memory_schema_catalog::InMemorySchemaCatalog;
pub use postgres_query_backend::PostgresQueryBackend;
pub use redis_record_lock_service::RedisRecordLockService;
