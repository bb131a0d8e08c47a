use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use recordgate_core::{AppError, AppResult};
use recordgate_domain::{FieldValues, GrantRecord, Operation, PolicyType};
use tracing::{debug, warn};

use crate::{GrantPair, GrantRecordRepository, RecordLock, RecordLockService};

/// Bounded-attempt retry policy for named-lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl LockRetryPolicy {
    /// Creates a validated retry policy.
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> AppResult<Self> {
        if max_attempts == 0 {
            return Err(AppError::Validation(
                "lock retry max_attempts must be greater than zero".to_owned(),
            ));
        }

        if initial_backoff.is_zero() {
            return Err(AppError::Validation(
                "lock retry initial_backoff must be greater than zero".to_owned(),
            ));
        }

        if max_backoff < initial_backoff {
            return Err(AppError::Validation(
                "lock retry max_backoff must not undercut initial_backoff".to_owned(),
            ));
        }

        Ok(Self {
            max_attempts,
            initial_backoff,
            max_backoff,
        })
    }

    /// Returns the maximum number of acquisition attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the backoff slept after the given failed attempt, doubling
    /// per attempt up to the configured cap.
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = 2u32.saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Desired grant-record state for one (subject, target) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantSyncRequest {
    /// The pair whose grant record is maintained.
    pub pair: GrantPair,
    /// Operations the record grants after the mutation.
    pub operations: BTreeSet<Operation>,
    /// Whether the record participates in matching afterwards.
    pub enabled: bool,
    /// Mapped field payloads written to the record.
    pub fields: BTreeMap<String, FieldValues>,
}

/// Application service for automated grant mutation.
///
/// A single grant record is the unit of mutual exclusion: the service
/// serializes read-modify-write per (subject, target) pair through a named
/// lock, retrying acquisition a bounded number of times and releasing the
/// lock unconditionally afterwards.
#[derive(Clone)]
pub struct GrantSyncService {
    locks: Arc<dyn RecordLockService>,
    repository: Arc<dyn GrantRecordRepository>,
    retry: LockRetryPolicy,
}

impl GrantSyncService {
    /// Creates the service from its ports and a retry policy.
    #[must_use]
    pub fn new(
        locks: Arc<dyn RecordLockService>,
        repository: Arc<dyn GrantRecordRepository>,
        retry: LockRetryPolicy,
    ) -> Self {
        Self {
            locks,
            repository,
            retry,
        }
    }

    /// Creates or updates the grant record for the request's pair.
    pub async fn sync_grant(
        &self,
        policy: &PolicyType,
        request: GrantSyncRequest,
    ) -> AppResult<GrantRecord> {
        if request.operations.is_empty() {
            return Err(AppError::Validation(
                "grant sync requires at least one operation".to_owned(),
            ));
        }

        for operation in &request.operations {
            if !policy.allows_operation(*operation) {
                return Err(AppError::Validation(format!(
                    "policy type '{}' does not grant operation '{operation}'",
                    policy.id()
                )));
            }
        }

        let lock = self.acquire_with_retry(request.pair.lock_key().as_str()).await?;
        let result = self.apply(policy, &request).await;
        self.release(&lock).await;
        result
    }

    async fn acquire_with_retry(&self, key: &str) -> AppResult<RecordLock> {
        for attempt in 1..=self.retry.max_attempts() {
            if let Some(lock) = self.locks.try_acquire(key).await? {
                return Ok(lock);
            }

            if attempt < self.retry.max_attempts() {
                let backoff = self.retry.backoff_after(attempt);
                debug!(
                    key = %key,
                    attempt = attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "grant record lock unavailable; backing off"
                );
                tokio::time::sleep(backoff).await;
            }
        }

        Err(AppError::Conflict(format!(
            "could not acquire grant record lock '{key}' after {} attempts",
            self.retry.max_attempts()
        )))
    }

    async fn apply(&self, policy: &PolicyType, request: &GrantSyncRequest) -> AppResult<GrantRecord> {
        let existing = self
            .repository
            .find_grant_for_pair(policy.id().as_str(), &request.pair)
            .await?;

        let record = match existing {
            Some(mut record) => {
                record.apply_update(
                    request.operations.clone(),
                    request.enabled,
                    request.fields.clone(),
                )?;
                record
            }
            None => GrantRecord::new(
                policy.id().as_str(),
                request.operations.clone(),
                request.enabled,
                request.fields.clone(),
            )?,
        };

        self.repository.save_grant(record, &request.pair).await
    }

    /// The lock is released on both the success and the error path; a
    /// failed release is logged, not propagated, so the mutation outcome
    /// stays authoritative.
    async fn release(&self, lock: &RecordLock) {
        if let Err(error) = self.locks.release(lock).await {
            warn!(key = %lock.key, error = %error, "failed to release grant record lock");
        }
    }
}
