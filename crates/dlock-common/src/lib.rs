//! dlock Common - Shared types, errors, and utilities
//!
//! This crate provides the foundational types used across all dlock components:
//! - Error taxonomy shared by every backend
//! - The backend discriminator (`LockKind`)
//! - Lock argument validation
//! - Time and host helpers

pub mod error;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use error::{DLockError, Result};
pub use utils::{current_unix_millis, current_unix_secs, expire_at_secs, local_ip};
pub use validation::*;

/// Table name used by the relational backend
pub const LOCK_TABLE: &str = "dlock";

/// Backend family a lock handle is implemented over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockKind {
    /// Transactional insert-if-absent on a lock table
    Relational,
    /// Lease-bound mutex of a consensus store
    LeaseStore,
    /// Atomic set-if-absent with expiry on a TTL cache
    TtlCache,
}

impl LockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LockKind::Relational => "relational",
            LockKind::LeaseStore => "lease-store",
            LockKind::TtlCache => "ttl-cache",
        }
    }
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LockKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "relational" => Ok(LockKind::Relational),
            "lease-store" => Ok(LockKind::LeaseStore),
            "ttl-cache" => Ok(LockKind::TtlCache),
            _ => Err(format!("Invalid lock type: {}", s)),
        }
    }
}
