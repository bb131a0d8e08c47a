use std::sync::Arc;

use recordgate_core::{AppError, AppResult, EntityId, EntityTypeId};
use recordgate_domain::{EntityInstance, Operation, PolicyType};

use crate::{EntityLoader, GrantQueryCompiler, PolicyTypeRepository, QueryBackend};

/// Outcome category of one access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessVerdict {
    /// A grant record authorizes the operation.
    Allowed,
    /// Applicable policy exists and no grant record matches.
    Forbidden,
    /// No applicable policy has an opinion.
    Neutral,
}

/// Decision returned to callers: a verdict plus a short reason.
///
/// Reasons are human-readable summaries; internal query structure is never
/// exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    verdict: AccessVerdict,
    reason: String,
}

impl AccessDecision {
    fn allowed(reason: impl Into<String>) -> Self {
        Self {
            verdict: AccessVerdict::Allowed,
            reason: reason.into(),
        }
    }

    fn forbidden(reason: impl Into<String>) -> Self {
        Self {
            verdict: AccessVerdict::Forbidden,
            reason: reason.into(),
        }
    }

    fn neutral(reason: impl Into<String>) -> Self {
        Self {
            verdict: AccessVerdict::Neutral,
            reason: reason.into(),
        }
    }

    /// Returns the verdict.
    #[must_use]
    pub fn verdict(&self) -> AccessVerdict {
        self.verdict
    }

    /// Returns the human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reason.as_str()
    }

    /// Returns whether the decision authorizes the operation.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.verdict == AccessVerdict::Allowed
    }
}

/// Application service orchestrating Point Mode checks across the policy
/// types applicable to a target and operation.
#[derive(Clone)]
pub struct AccessDecisionService {
    policy_types: Arc<dyn PolicyTypeRepository>,
    backend: Arc<dyn QueryBackend>,
    loader: Arc<dyn EntityLoader>,
    compiler: GrantQueryCompiler,
}

impl AccessDecisionService {
    /// Creates the service from its ports and a compiler.
    #[must_use]
    pub fn new(
        policy_types: Arc<dyn PolicyTypeRepository>,
        backend: Arc<dyn QueryBackend>,
        loader: Arc<dyn EntityLoader>,
        compiler: GrantQueryCompiler,
    ) -> Self {
        Self {
            policy_types,
            backend,
            loader,
            compiler,
        }
    }

    /// Decides whether the subject may perform the operation on the target.
    pub async fn decide_entity_access(
        &self,
        target: &EntityInstance,
        operation: Operation,
        subject: &EntityInstance,
    ) -> AppResult<AccessDecision> {
        let applicable = self
            .applicable_types(target.entity_type(), operation)
            .await?;
        if applicable.is_empty() {
            return Ok(AccessDecision::neutral(format!(
                "no policy type grants '{operation}' on '{}'",
                target.entity_type()
            )));
        }

        if subject.id().is_none() {
            // An unpersisted subject can never satisfy a record match, so
            // the presence of any candidate type is itself disqualifying.
            return Ok(AccessDecision::forbidden(
                "subject has no durable identity",
            ));
        }

        self.first_match_decision(&applicable, subject, target, operation)
            .await
    }

    /// Loads the target by id, then decides access for it.
    pub async fn decide_entity_access_by_id(
        &self,
        target_entity_type: &EntityTypeId,
        target_id: &EntityId,
        operation: Operation,
        subject: &EntityInstance,
    ) -> AppResult<AccessDecision> {
        let target = self
            .loader
            .load(target_entity_type, target_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "no '{target_entity_type}' entity with id '{target_id}'"
                ))
            })?;

        self.decide_entity_access(&target, operation, subject).await
    }

    /// Decides whether the subject may perform the operation on one field of
    /// the target.
    pub async fn decide_field_access(
        &self,
        operation: Operation,
        field_name: &str,
        target: &EntityInstance,
        subject: &EntityInstance,
    ) -> AppResult<AccessDecision> {
        let candidates: Vec<PolicyType> = self
            .applicable_types(target.entity_type(), operation)
            .await?
            .into_iter()
            .filter(PolicyType::field_access_enabled)
            .collect();
        if candidates.is_empty() {
            return Ok(AccessDecision::neutral(format!(
                "no policy type opts into field access on '{}'",
                target.entity_type()
            )));
        }

        let allowing: Vec<PolicyType> = candidates
            .into_iter()
            .filter(|policy| policy.allows_field_access(field_name))
            .collect();
        if allowing.is_empty() {
            // Field access is enabled for this target kind, so a field
            // outside every allow-list is an explicit denial.
            return Ok(AccessDecision::forbidden(format!(
                "field '{field_name}' is outside every field-access allow-list"
            )));
        }

        if subject.id().is_none() {
            return Ok(AccessDecision::forbidden(
                "subject has no durable identity",
            ));
        }

        self.first_match_decision(&allowing, subject, target, operation)
            .await
    }

    /// Route-level helper: returns whether any grant record of the policy
    /// type matches the subject for the operation.
    pub async fn any_grant_exists(
        &self,
        policy: &PolicyType,
        subject_id: &EntityId,
        operation: Operation,
    ) -> AppResult<bool> {
        let Some(query) =
            self.compiler
                .compile_set_query(policy, Some(subject_id), operation, true, false)?
        else {
            return Ok(false);
        };

        let rows = self.backend.fetch_match_rows(&query).await?;
        Ok(rows
            .iter()
            .any(|row| row.subject_id.as_ref() == Some(subject_id)))
    }

    async fn applicable_types(
        &self,
        target_entity_type: &EntityTypeId,
        operation: Operation,
    ) -> AppResult<Vec<PolicyType>> {
        Ok(self
            .policy_types
            .list_for_target(target_entity_type)
            .await?
            .into_iter()
            .filter(|policy| policy.allows_operation(operation))
            .collect())
    }

    async fn first_match_decision(
        &self,
        policies: &[PolicyType],
        subject: &EntityInstance,
        target: &EntityInstance,
        operation: Operation,
    ) -> AppResult<AccessDecision> {
        for policy in policies {
            // A policy type that compiles to no query cannot grant; the
            // remaining candidates are still consulted.
            let Some(query) =
                self.compiler
                    .compile_point_query(policy, Some(subject), Some(target), operation)?
            else {
                continue;
            };

            let grant_ids = self.backend.fetch_grant_ids(&query.with_limit(1)).await?;
            if !grant_ids.is_empty() {
                return Ok(AccessDecision::allowed(format!(
                    "grant record matches policy type '{}'",
                    policy.id()
                )));
            }
        }

        Ok(AccessDecision::forbidden(
            "policy types exist but no grant record matches",
        ))
    }
}

#[cfg(test)]
mod tests;
