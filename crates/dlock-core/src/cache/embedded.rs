// In-process TTL cache
// Entries expire lazily: every read checks the deadline first

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use dlock_common::Result;

use super::store::{CacheStore, CompareDelete};

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// TTL cache kept in memory
#[derive(Default)]
pub struct EmbeddedCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl EmbeddedCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        self.entries.get(key).map(|entry| entry.value.clone())
    }
}

#[async_trait]
impl CacheStore for EmbeddedCacheStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let entry = CacheEntry {
            value: value.to_string(),
            expires_at: now + ttl,
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live_value(key).is_some())
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        Ok(match self.entries.remove(key) {
            Some((_, entry)) if entry.is_live(now) => 1,
            _ => 0,
        })
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<CompareDelete> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Vacant(_) => Ok(CompareDelete::Absent),
            Entry::Occupied(occupied) => {
                if !occupied.get().is_live(now) {
                    occupied.remove();
                    Ok(CompareDelete::Absent)
                } else if occupied.get().value == value {
                    occupied.remove();
                    Ok(CompareDelete::Deleted)
                } else {
                    Ok(CompareDelete::Mismatch)
                }
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = EmbeddedCacheStore::new();
        let ttl = Duration::from_secs(300);

        assert!(store.set_if_absent("job_id", "token-A", ttl).await.unwrap());
        assert!(!store.set_if_absent("job_id", "token-B", ttl).await.unwrap());
        assert_eq!(store.get("job_id").await.unwrap().as_deref(), Some("token-A"));
    }

    #[tokio::test]
    async fn test_expired_entry_is_gone() {
        let store = EmbeddedCacheStore::new();

        store
            .set_if_absent("job_id", "token-A", Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!store.exists("job_id").await.unwrap());
        assert_eq!(store.delete("job_id").await.unwrap(), 0);
        assert!(
            store
                .set_if_absent("job_id", "token-B", Duration::from_secs(1))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = EmbeddedCacheStore::new();
        store
            .set_if_absent("job_id", "token-A", Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!(
            store.compare_and_delete("job_id", "token-B").await.unwrap(),
            CompareDelete::Mismatch
        );
        assert_eq!(
            store.compare_and_delete("job_id", "token-A").await.unwrap(),
            CompareDelete::Deleted
        );
        assert_eq!(
            store.compare_and_delete("job_id", "token-A").await.unwrap(),
            CompareDelete::Absent
        );
    }
}
