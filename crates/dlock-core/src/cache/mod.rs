//! TTL cache backend
//!
//! Atomic set-if-absent with expiry. Contention is `Ok(false)`.

pub mod embedded;
pub mod redis;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use dlock_common::{DLockError, LockKind, Result, validate_lock_key, validate_ttl};

use crate::lock::DistributedLock;

pub use embedded::EmbeddedCacheStore;
pub use self::redis::RedisCacheStore;
pub use store::{CacheStore, CompareDelete};

#[derive(Debug, Clone)]
struct HeldToken {
    owner_token: String,
    deadline: Instant,
}

/// Lock handle over a [`CacheStore`]
pub struct CacheLock {
    store: Arc<dyn CacheStore>,
    held: Mutex<HashMap<String, HeldToken>>,
}

impl CacheLock {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Whether this handle still remembers acquiring `key`
    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().contains_key(key)
    }

    async fn release_owned(&self, key: &str, owner_token: &str) -> Result<()> {
        let outcome = self.store.compare_and_delete(key, owner_token).await?;
        {
            let mut held = self.held.lock();
            if held.get(key).is_some_and(|entry| entry.owner_token == owner_token) {
                held.remove(key);
            }
        }
        match outcome {
            CompareDelete::Deleted | CompareDelete::Absent => {
                debug!(key = %key, outcome = ?outcome, "cache lock released");
                Ok(())
            }
            CompareDelete::Mismatch => Err(DLockError::NotOwner {
                key: key.to_string(),
                owner: owner_token.to_string(),
            }),
        }
    }
}

#[async_trait]
impl DistributedLock for CacheLock {
    async fn acquire(
        &self,
        ttl: Duration,
        key: &str,
        owner_token: &str,
        host: &str,
    ) -> Result<bool> {
        validate_lock_key(key)?;
        validate_ttl(ttl)?;

        match self.store.set_if_absent(key, owner_token, ttl).await {
            Ok(true) => {
                debug!(key = %key, host = %host, "cache lock acquired");
                let now = Instant::now();
                let mut held = self.held.lock();
                // keys that expired without an unlock
                held.retain(|_, entry| entry.deadline > now);
                held.insert(
                    key.to_string(),
                    HeldToken {
                        owner_token: owner_token.to_string(),
                        deadline: now + ttl,
                    },
                );
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                // The set may have landed before the error surfaced
                if let Err(cleanup) = self.store.compare_and_delete(key, owner_token).await {
                    warn!(key = %key, "cleanup after failed acquire failed: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    async fn is_locked(&self, key: &str) -> Result<bool> {
        validate_lock_key(key)?;
        self.store.exists(key).await
    }

    async fn unlock(&self, key: &str) -> Result<()> {
        validate_lock_key(key)?;
        let owner_token = self.held.lock().get(key).map(|entry| entry.owner_token.clone());
        match owner_token {
            Some(owner_token) => self.release_owned(key, &owner_token).await,
            None => {
                let removed = self.store.delete(key).await?;
                debug!(key = %key, removed = removed, "cache lock deleted");
                Ok(())
            }
        }
    }

    async fn unlock_owned(&self, key: &str, owner_token: &str) -> Result<()> {
        validate_lock_key(key)?;
        self.release_owned(key, owner_token).await
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        validate_lock_key(key)?;
        self.store.get(key).await
    }

    fn lock_type(&self) -> LockKind {
        LockKind::TtlCache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    const TTL: Duration = Duration::from_secs(300);

    fn lock_over(store: &Arc<EmbeddedCacheStore>) -> CacheLock {
        CacheLock::new(store.clone() as Arc<dyn CacheStore>)
    }

    /// Lands the write, then reports a transport failure
    #[derive(Default)]
    struct FlakyStore {
        inner: EmbeddedCacheStore,
        cleaned_up: AtomicBool,
    }

    #[async_trait]
    impl CacheStore for FlakyStore {
        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
            self.inner.set_if_absent(key, value, ttl).await?;
            Err(DLockError::store("cache.set", "connection reset by peer"))
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }

        async fn delete(&self, key: &str) -> Result<u64> {
            self.inner.delete(key).await
        }

        async fn compare_and_delete(&self, key: &str, value: &str) -> Result<CompareDelete> {
            self.cleaned_up.store(true, Ordering::SeqCst);
            self.inner.compare_and_delete(key, value).await
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_contention_is_false() {
        let store = Arc::new(EmbeddedCacheStore::new());
        let lock = lock_over(&store);

        assert!(lock.acquire(TTL, "job_id", "token-A", "host1").await.unwrap());
        assert!(!lock.acquire(TTL, "job_id", "token-B", "host2").await.unwrap());
        assert_eq!(
            lock.get_value("job_id").await.unwrap().as_deref(),
            Some("token-A")
        );
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = Arc::new(EmbeddedCacheStore::new());
        let lock = lock_over(&store);

        lock.acquire(Duration::from_millis(50), "job_id", "token-A", "host1")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!lock.is_locked("job_id").await.unwrap());
        assert!(lock.get_value("job_id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_late_unlock_keeps_new_holder() {
        let store = Arc::new(EmbeddedCacheStore::new());
        let stale = lock_over(&store);
        let fresh = lock_over(&store);

        stale
            .acquire(Duration::from_millis(50), "job_id", "token-A", "host1")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(fresh.acquire(TTL, "job_id", "token-B", "host2").await.unwrap());

        let err = stale.unlock("job_id").await.unwrap_err();
        assert!(matches!(err, DLockError::NotOwner { .. }));
        assert_eq!(
            fresh.get_value("job_id").await.unwrap().as_deref(),
            Some("token-B")
        );
    }

    #[tokio::test]
    async fn test_unlock_without_acquire_deletes() {
        let store = Arc::new(EmbeddedCacheStore::new());
        let holder = lock_over(&store);
        let admin = lock_over(&store);

        holder.acquire(TTL, "job_id", "token-A", "host1").await.unwrap();
        admin.unlock("job_id").await.unwrap();
        assert!(!holder.is_locked("job_id").await.unwrap());

        // absent key
        admin.unlock("job_id").await.unwrap();
    }

    #[tokio::test]
    async fn test_unlock_owned_checks_token() {
        let store = Arc::new(EmbeddedCacheStore::new());
        let lock = lock_over(&store);

        lock.acquire(TTL, "job_id", "token-A", "host1").await.unwrap();
        assert!(matches!(
            lock.unlock_owned("job_id", "token-B").await,
            Err(DLockError::NotOwner { .. })
        ));
        assert!(lock.is_locked("job_id").await.unwrap());

        lock.unlock_owned("job_id", "token-A").await.unwrap();
        assert!(!lock.is_locked("job_id").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_acquire_cleans_up() {
        let store = Arc::new(FlakyStore::default());
        let lock = CacheLock::new(store.clone() as Arc<dyn CacheStore>);

        let err = lock
            .acquire(TTL, "job_id", "token-A", "host1")
            .await
            .unwrap_err();
        assert!(matches!(err, DLockError::Store { operation: "cache.set", .. }));
        assert!(store.cleaned_up.load(Ordering::SeqCst));
        assert!(!lock.is_locked("job_id").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_keys_are_pruned_on_acquire() {
        let store = Arc::new(EmbeddedCacheStore::new());
        let lock = lock_over(&store);

        lock.acquire(Duration::from_millis(50), "job_a", "token-A", "host1")
            .await
            .unwrap();
        assert!(lock.is_held("job_a"));
        tokio::time::sleep(Duration::from_millis(80)).await;

        lock.acquire(TTL, "job_b", "token-B", "host1").await.unwrap();
        assert!(!lock.is_held("job_a"));
        assert!(lock.is_held("job_b"));
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let lock = lock_over(&Arc::new(EmbeddedCacheStore::new()));
        assert!(matches!(
            lock.acquire(Duration::ZERO, "job_id", "token-A", "host1").await,
            Err(DLockError::IllegalArgument(_))
        ));
        assert_eq!(lock.lock_type(), LockKind::TtlCache);
    }
}
