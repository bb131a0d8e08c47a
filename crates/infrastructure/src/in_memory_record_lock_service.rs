use std::collections::HashMap;

use async_trait::async_trait;
use recordgate_application::{RecordLock, RecordLockService};
use recordgate_core::AppResult;
use tokio::sync::Mutex;

/// Process-local named-lock service.
///
/// Suitable for single-process embeddings and tests; distributed
/// deployments use the redis-backed service instead.
#[derive(Default)]
pub struct InMemoryRecordLockService {
    held: Mutex<HashMap<String, String>>,
}

impl InMemoryRecordLockService {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordLockService for InMemoryRecordLockService {
    async fn try_acquire(&self, key: &str) -> AppResult<Option<RecordLock>> {
        let mut held = self.held.lock().await;
        if held.contains_key(key) {
            return Ok(None);
        }

        let token = uuid::Uuid::new_v4().to_string();
        held.insert(key.to_owned(), token.clone());
        Ok(Some(RecordLock {
            key: key.to_owned(),
            token,
        }))
    }

    async fn release(&self, lock: &RecordLock) -> AppResult<()> {
        let mut held = self.held.lock().await;
        if held.get(lock.key.as_str()) == Some(&lock.token) {
            held.remove(lock.key.as_str());
        }

        Ok(())
    }
}
