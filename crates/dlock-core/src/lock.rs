//! Uniform lock contract
//!
//! Every backend implements [`DistributedLock`]. The contract is the same
//! everywhere except for the contention signal, which stays backend
//! specific: the relational backend fails `acquire` with
//! `DLockError::AlreadyExists`, the lease-store and ttl-cache backends
//! return `Ok(false)`.

use std::time::Duration;

use async_trait::async_trait;
use dlock_common::{LockKind, Result};

/// Distributed lock handle
///
/// A handle is driven by one logical owner at a time. It remembers the
/// owner token of every key it acquired, so `unlock` on such a key only
/// releases the lock while that token still holds it.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Acquire `key` for `owner_token`, expiring after `ttl`
    ///
    /// `host` is attribution only.
    async fn acquire(&self, ttl: Duration, key: &str, owner_token: &str, host: &str)
    -> Result<bool>;

    /// Check whether `key` is currently held
    async fn is_locked(&self, key: &str) -> Result<bool>;

    /// Release `key`
    ///
    /// Uses the owner token this handle acquired `key` with; when the handle
    /// never acquired `key`, releases it regardless of owner.
    async fn unlock(&self, key: &str) -> Result<()>;

    /// Release `key` only if `owner_token` currently holds it
    async fn unlock_owned(&self, key: &str, owner_token: &str) -> Result<()>;

    /// Owner token of the current holder of `key`, `None` when unlocked
    async fn get_value(&self, key: &str) -> Result<Option<String>>;

    /// Backend family of this handle
    fn lock_type(&self) -> LockKind;
}
