use std::time::Duration;

use async_trait::async_trait;
use dlock_common::Result;

/// Outcome of an atomic compare-and-delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareDelete {
    /// Key held the expected value and was removed
    Deleted,
    /// Key did not exist
    Absent,
    /// Key holds another value and was left in place
    Mismatch,
}

impl CompareDelete {
    /// Decode the compare-and-delete script reply
    pub fn from_reply(reply: i64) -> Self {
        match reply {
            r if r > 0 => CompareDelete::Deleted,
            0 => CompareDelete::Absent,
            _ => CompareDelete::Mismatch,
        }
    }
}

/// TTL key-value primitives used by the cache backend
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Set `key` to `value` with expiry unless it exists
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Delete `key`, returning the number of keys removed
    async fn delete(&self, key: &str) -> Result<u64>;

    /// Delete `key` only while it holds `value`, in one atomic step
    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<CompareDelete>;

    async fn ping(&self) -> Result<()>;
}
