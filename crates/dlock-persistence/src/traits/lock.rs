//! Lock repository trait
//!
//! Defines the interface for lock row storage operations.

use async_trait::async_trait;
use dlock_common::Result;

use crate::model::{LockRecord, NewLockRecord};

/// Lock row operations
///
/// A row is active while `deleted_at` is null and `expire_at` is in the
/// future; at most one active row exists per name.
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Insert a lock row unless an active row exists for the same name
    ///
    /// The existence check and the insert run in one serialized unit.
    /// Returns the id of the new row, or `DLockError::AlreadyExists`.
    async fn acquire(&self, record: NewLockRecord) -> Result<i64>;

    /// Find the active row for a name
    async fn find_active(&self, name: &str) -> Result<Option<LockRecord>>;

    /// Soft-delete the active row for a name
    ///
    /// With `owner_token` set, the row is only released when it carries that
    /// token, otherwise `DLockError::NotOwner` is returned. A missing active
    /// row is a success with zero rows affected.
    async fn release(&self, name: &str, owner_token: Option<&str>) -> Result<u64>;

    /// Health check for the storage backend
    async fn health_check(&self) -> Result<()>;

    /// Release the underlying connections
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
