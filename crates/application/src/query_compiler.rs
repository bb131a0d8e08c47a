use std::sync::Arc;

use recordgate_core::{AppError, AppResult, EntityId};
use recordgate_domain::{
    EntityInstance, FieldMapping, GrantMatchQuery, GrantScanQuery, Operation, PolicyType,
};
use tracing::warn;

use crate::{EngineConfig, MappingResolver, SchemaCatalog};

mod plans;
mod point;
mod set;

/// Alias of the grant-record sub-plan in compiled queries.
pub(crate) const GRANT_ALIAS: &str = "grants";
/// Alias of the subject sub-plan in compiled Set Mode queries.
pub(crate) const SUBJECT_ALIAS: &str = "subjects";
/// Alias of the target sub-plan in compiled Set Mode queries.
pub(crate) const TARGET_ALIAS: &str = "targets";

/// Compiles policy types into executable query plans.
///
/// Set Mode produces a join-based plan over grant, subject and target
/// storage; Point Mode embeds the field values of concrete instances as
/// literal conditions. Both modes fail closed: a misconfigured policy type
/// compiles to no query at all.
#[derive(Clone)]
pub struct GrantQueryCompiler {
    catalog: Arc<dyn SchemaCatalog>,
    config: EngineConfig,
    resolver: MappingResolver,
}

impl GrantQueryCompiler {
    /// Creates a compiler from a schema catalog and engine configuration.
    #[must_use]
    pub fn new(catalog: Arc<dyn SchemaCatalog>, config: EngineConfig) -> Self {
        let resolver = MappingResolver::new(catalog.clone(), config.clone());
        Self {
            catalog,
            config,
            resolver,
        }
    }

    /// Compiles a bulk matching plan for one policy type and operation.
    ///
    /// `fixed_subject_id` narrows the subject sub-plan to one principal and
    /// is only meaningful together with `join_subjects`. Returns `None` for
    /// a misconfigured policy type; callers must treat `None` as "cannot
    /// grant".
    pub fn compile_set_query(
        &self,
        policy: &PolicyType,
        fixed_subject_id: Option<&EntityId>,
        operation: Operation,
        join_subjects: bool,
        join_targets: bool,
    ) -> AppResult<Option<GrantMatchQuery>> {
        self.compile_set(
            policy,
            fixed_subject_id,
            operation,
            join_subjects,
            join_targets,
        )
    }

    /// Compiles an existence plan for concrete subject and/or target
    /// instances.
    ///
    /// Fails with a validation error when a supplied instance's entity kind
    /// does not match the policy type's declared kind. Returns `None` for a
    /// misconfigured policy type.
    pub fn compile_point_query(
        &self,
        policy: &PolicyType,
        subject: Option<&EntityInstance>,
        target: Option<&EntityInstance>,
        operation: Operation,
    ) -> AppResult<Option<GrantScanQuery>> {
        self.compile_point(policy, subject, target, operation)
    }

    /// Resolves field mappings, converting misconfiguration into the
    /// fail-closed "no query" outcome.
    fn mappings_for(&self, policy: &PolicyType) -> AppResult<Option<Vec<FieldMapping>>> {
        match self.resolver.resolve(policy) {
            Ok(mappings) if mappings.is_empty() => {
                warn!(
                    policy_type = %policy.id(),
                    "policy type resolves to no field mapping; failing closed"
                );
                Ok(None)
            }
            Ok(mappings) => Ok(Some(mappings)),
            Err(AppError::Validation(reason)) => {
                warn!(
                    policy_type = %policy.id(),
                    reason = %reason,
                    "policy type field mapping is misconfigured; failing closed"
                );
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}
