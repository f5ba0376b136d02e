//! Relational backend
//!
//! Transactional insert-if-absent on the `dlock` table. Contention is an
//! error here (`DLockError::AlreadyExists`), not `Ok(false)`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use dlock_common::{
    DLockError, LockKind, Result, current_unix_secs, expire_at_secs, validate_column_width,
    validate_lock_key, validate_ttl,
};
use dlock_persistence::{LockRepository, NewLockRecord};

use crate::lock::DistributedLock;

#[derive(Debug, Clone)]
struct HeldRow {
    id: i64,
    owner_token: String,
    expire_at: i64,
}

/// Lock handle over a [`LockRepository`]
///
/// Every handle of one client shares the repository and its pool.
pub struct RelationalLock {
    repository: Arc<dyn LockRepository>,
    held: Mutex<HashMap<String, HeldRow>>,
}

impl RelationalLock {
    pub fn new(repository: Arc<dyn LockRepository>) -> Self {
        Self {
            repository,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Id of the row this handle inserted for `key`, if it still tracks one
    pub fn held_row_id(&self, key: &str) -> Option<i64> {
        self.held.lock().get(key).map(|row| row.id)
    }

    async fn release(&self, key: &str, owner_token: Option<&str>) -> Result<()> {
        let result = self.repository.release(key, owner_token).await;
        match &result {
            Ok(rows) => {
                debug!(key = %key, rows = rows, "relational lock released");
                self.forget(key, owner_token);
            }
            Err(DLockError::NotOwner { .. }) => self.forget(key, owner_token),
            Err(_) => {}
        }
        result.map(|_| ())
    }

    fn forget(&self, key: &str, owner_token: Option<&str>) {
        let mut held = self.held.lock();
        let matches = match (held.get(key), owner_token) {
            (Some(row), Some(owner)) => row.owner_token == owner,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if matches {
            held.remove(key);
        }
    }
}

#[async_trait]
impl DistributedLock for RelationalLock {
    async fn acquire(
        &self,
        ttl: Duration,
        key: &str,
        owner_token: &str,
        host: &str,
    ) -> Result<bool> {
        validate_lock_key(key)?;
        validate_ttl(ttl)?;
        validate_column_width("name", key)?;
        validate_column_width("lock_resource", owner_token)?;
        validate_column_width("host", host)?;

        let expire_at = expire_at_secs(ttl);
        let record = NewLockRecord::new(key, owner_token, host, expire_at);
        let id = self.repository.acquire(record).await?;

        debug!(key = %key, host = %host, id = id, "relational lock acquired");
        let mut held = self.held.lock();
        // rows that lapsed without an unlock
        let now = current_unix_secs();
        held.retain(|_, row| row.expire_at > now);
        held.insert(
            key.to_string(),
            HeldRow {
                id,
                owner_token: owner_token.to_string(),
                expire_at,
            },
        );
        Ok(true)
    }

    async fn is_locked(&self, key: &str) -> Result<bool> {
        validate_lock_key(key)?;
        Ok(self.repository.find_active(key).await?.is_some())
    }

    async fn unlock(&self, key: &str) -> Result<()> {
        validate_lock_key(key)?;
        let owner_token = self.held.lock().get(key).map(|row| row.owner_token.clone());
        self.release(key, owner_token.as_deref()).await
    }

    async fn unlock_owned(&self, key: &str, owner_token: &str) -> Result<()> {
        validate_lock_key(key)?;
        self.release(key, Some(owner_token)).await
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        validate_lock_key(key)?;
        Ok(self
            .repository
            .find_active(key)
            .await?
            .map(|record| record.owner_token))
    }

    fn lock_type(&self) -> LockKind {
        LockKind::Relational
    }
}
