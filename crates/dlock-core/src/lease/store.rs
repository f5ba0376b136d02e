use async_trait::async_trait;
use dlock_common::Result;

/// Lease-bound mutex primitives of a consensus store
///
/// A lock named `name` is held by the key `<name>/<lease id hex>` with the
/// oldest create revision under the `<name>/` prefix. Keys live as long as
/// the lease they are attached to.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Grant a lease of `ttl_secs`; 0 lets the store apply its minimum
    ///
    /// Fails with `DLockError::LeaseGrant`.
    async fn grant(&self, ttl_secs: i64) -> Result<i64>;

    /// Wait until `name` is free and take it under `lease_id`
    ///
    /// Returns the lock key. Fails with `DLockError::LockAcquire`.
    async fn lock(&self, name: &str, lease_id: i64) -> Result<String>;

    /// Store the owner token as the value of a lock key, bound to the lease
    async fn put_owner(&self, lock_key: &str, owner_token: &str, lease_id: i64) -> Result<()>;

    /// Delete a lock key
    async fn unlock(&self, lock_key: &str) -> Result<()>;

    /// Revoke a lease and every key attached to it
    ///
    /// Returns `false` when the store no longer knows the lease.
    async fn revoke(&self, lease_id: i64) -> Result<bool>;

    /// Value of the current holder's lock key of `name`
    ///
    /// Empty between the Lock RPC and `put_owner`.
    async fn holder(&self, name: &str) -> Result<Option<String>>;

    /// Cluster reachability check
    async fn ping(&self) -> Result<()>;
}

/// Prefix shared by every candidate key of a lock name
pub fn lock_prefix(name: &str) -> String {
    format!("{}/", name)
}

/// Lock key of a lease on a lock name
pub fn lock_key(name: &str, lease_id: i64) -> String {
    format!("{}{:x}", lock_prefix(name), lease_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_layout() {
        assert_eq!(lock_prefix("job_id"), "job_id/");
        assert_eq!(lock_key("job_id", 0x694d7a2b), "job_id/694d7a2b");
    }
}
