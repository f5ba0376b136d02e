//! Lease-store backend
//!
//! A lock is a lease-bound mutex of a consensus store. If the holder dies,
//! the lease lapses and the store frees the lock by itself. Contention that
//! outlasts the ttl is reported as `Ok(false)`.

pub mod embedded;
pub mod etcd;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use dlock_common::{DLockError, LockKind, Result, validate_lock_key};

use crate::lock::DistributedLock;

pub use embedded::EmbeddedLeaseStore;
pub use etcd::EtcdLeaseStore;
pub use store::LeaseStore;

/// State of one lock held through a lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSession {
    pub lease_id: i64,
    /// Key created by the Lock RPC, `<key>/<lease id hex>`
    pub lock_key: String,
    pub owner_token: String,
    pub ttl: Duration,
}

/// Lock handle over a [`LeaseStore`]
///
/// Keeps one session per key, so a handle can hold several keys at once.
pub struct LeaseLock {
    store: Arc<dyn LeaseStore>,
    sessions: Mutex<HashMap<String, LeaseSession>>,
}

impl LeaseLock {
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Session this handle holds for `key`
    pub fn session(&self, key: &str) -> Option<LeaseSession> {
        self.sessions.lock().get(key).cloned()
    }

    async fn abandon(&self, lease_id: i64) {
        if let Err(e) = self.store.revoke(lease_id).await {
            warn!(lease_id = lease_id, "revoke abandoned lease failed: {}", e);
        }
    }

    /// Unlock and revoke; the session is forgotten once the store no longer holds it
    async fn close_session(&self, key: &str, session: LeaseSession) -> Result<()> {
        let result = self.unlock_and_revoke(key, &session).await;
        match &result {
            Ok(()) | Err(DLockError::LeaseExpired(_)) => {
                let mut sessions = self.sessions.lock();
                if sessions
                    .get(key)
                    .is_some_and(|held| held.lease_id == session.lease_id)
                {
                    sessions.remove(key);
                }
            }
            Err(e) => warn!(
                key = %key,
                lease_id = session.lease_id,
                "lease unlock failed, session kept: {}",
                e
            ),
        }
        result
    }

    async fn unlock_and_revoke(&self, key: &str, session: &LeaseSession) -> Result<()> {
        self.store.unlock(&session.lock_key).await?;
        if !self.store.revoke(session.lease_id).await? {
            return Err(DLockError::LeaseExpired(key.to_string()));
        }
        debug!(key = %key, lease_id = session.lease_id, "lease lock released");
        Ok(())
    }
}

/// Lease ttl in whole seconds, rounded up
fn lease_ttl_secs(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs as i64
}

#[async_trait]
impl DistributedLock for LeaseLock {
    async fn acquire(
        &self,
        ttl: Duration,
        key: &str,
        owner_token: &str,
        host: &str,
    ) -> Result<bool> {
        validate_lock_key(key)?;

        let lease_id = self.store.grant(lease_ttl_secs(ttl)).await?;

        let locked = if ttl.is_zero() {
            self.store.lock(key, lease_id).await
        } else {
            match tokio::time::timeout(ttl, self.store.lock(key, lease_id)).await {
                Ok(locked) => locked,
                Err(_) => {
                    debug!(key = %key, "lease lock wait deadline elapsed");
                    self.abandon(lease_id).await;
                    return Ok(false);
                }
            }
        };
        let lock_key = match locked {
            Ok(lock_key) => lock_key,
            Err(e) => {
                self.abandon(lease_id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.store.put_owner(&lock_key, owner_token, lease_id).await {
            self.abandon(lease_id).await;
            return Err(e);
        }

        debug!(key = %key, host = %host, lease_id = lease_id, "lease lock acquired");
        self.sessions.lock().insert(
            key.to_string(),
            LeaseSession {
                lease_id,
                lock_key,
                owner_token: owner_token.to_string(),
                ttl,
            },
        );
        Ok(true)
    }

    async fn is_locked(&self, key: &str) -> Result<bool> {
        validate_lock_key(key)?;
        Ok(self.store.holder(key).await?.is_some())
    }

    async fn unlock(&self, key: &str) -> Result<()> {
        validate_lock_key(key)?;
        let session = self
            .session(key)
            .ok_or_else(|| DLockError::SessionNotFound(key.to_string()))?;
        self.close_session(key, session).await
    }

    async fn unlock_owned(&self, key: &str, owner_token: &str) -> Result<()> {
        validate_lock_key(key)?;
        let session = self
            .session(key)
            .ok_or_else(|| DLockError::SessionNotFound(key.to_string()))?;
        if session.owner_token != owner_token {
            return Err(DLockError::NotOwner {
                key: key.to_string(),
                owner: owner_token.to_string(),
            });
        }
        self.close_session(key, session).await
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        validate_lock_key(key)?;
        // the lock key is empty until the holder has written its token
        Ok(self
            .store
            .holder(key)
            .await?
            .filter(|token| !token.is_empty()))
    }

    fn lock_type(&self) -> LockKind {
        LockKind::LeaseStore
    }
}
