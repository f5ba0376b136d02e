//! dlock Persistence - Lock table entity and lock repositories
//!
//! This crate provides:
//! - The SeaORM entity for the `dlock` table
//! - The `LockRepository` trait implementing the relational lock protocol
//! - An external database repository (MySQL/PostgreSQL via SeaORM)
//! - An embedded in-process repository with the same semantics

pub mod embedded;
pub mod entity;
pub mod model;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

// Re-export persistence traits
pub use traits::LockRepository;

// Re-export SQL backend
pub use sql::SqlLockRepository;

// Re-export embedded backend
pub use embedded::EmbeddedLockRepository;

// Re-export model types
pub use model::{LockRecord, NewLockRecord};
