//! dlock Core - Distributed lock over interchangeable stores
//!
//! This crate provides:
//! - The uniform lock contract (`DistributedLock`)
//! - Typed backend configuration (`LockConfig`)
//! - Backend selection and client ownership (`LockClient`)
//! - Relational, lease-store and ttl-cache lock backends

pub mod cache;
pub mod client;
pub mod config;
pub mod lease;
pub mod lock;
pub mod relational;

// Re-exports for convenience
pub use cache::CacheLock;
pub use client::LockClient;
pub use self::config::{
    DatabaseDriver, LeaseStoreAuth, LeaseStoreConfig, LockConfig, RelationalConfig,
    TtlCacheConfig,
};
pub use dlock_common::{DLockError, LockKind, Result};
pub use lease::{LeaseLock, LeaseSession};
pub use lock::DistributedLock;
pub use relational::RelationalLock;
