//! Redis-backed named locks for automated grant mutation.

use async_trait::async_trait;
use recordgate_application::{RecordLock, RecordLockService};
use recordgate_core::{AppError, AppResult};
use redis::{AsyncCommands, Script};
use tracing::debug;

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of the record lock service.
///
/// Locks are held with a TTL so a crashed holder cannot block a pair
/// forever; release is token-checked and therefore safe after expiry.
#[derive(Clone)]
pub struct RedisRecordLockService {
    client: redis::Client,
    key_prefix: String,
    ttl_seconds: u32,
}

impl RedisRecordLockService {
    /// Creates a lock service with the given key prefix and lock TTL.
    pub fn new(
        client: redis::Client,
        key_prefix: impl Into<String>,
        ttl_seconds: u32,
    ) -> AppResult<Self> {
        if ttl_seconds == 0 {
            return Err(AppError::Validation(
                "record lock ttl_seconds must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            ttl_seconds,
        })
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }
}

#[async_trait]
impl RecordLockService for RedisRecordLockService {
    async fn try_acquire(&self, key: &str) -> AppResult<Option<RecordLock>> {
        if key.trim().is_empty() {
            return Err(AppError::Validation(
                "record lock key must not be empty".to_owned(),
            ));
        }

        let prefixed = self.key_for(key);
        let token = uuid::Uuid::new_v4().to_string();

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let acquired: bool = connection
            .set_nx(prefixed.as_str(), token.as_str())
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire record lock: {error}"))
            })?;

        if !acquired {
            return Ok(None);
        }

        connection
            .expire::<_, ()>(prefixed.as_str(), i64::from(self.ttl_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to set record lock ttl: {error}"))
            })?;

        debug!(key = %key, ttl_seconds = self.ttl_seconds, "acquired record lock");
        Ok(Some(RecordLock {
            key: key.to_owned(),
            token,
        }))
    }

    async fn release(&self, lock: &RecordLock) -> AppResult<()> {
        let prefixed = self.key_for(lock.key.as_str());
        let script = Script::new(RELEASE_LOCK_SCRIPT);

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        script
            .key(prefixed)
            .arg(lock.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release record lock: {error}"))
            })?;

        debug!(key = %lock.key, "released record lock");
        Ok(())
    }
}
