//! Persistence traits for the relational lock protocol
//!
//! This module defines the repository trait that abstracts over the
//! storage of lock rows: an external database (MySQL/PostgreSQL) or the
//! embedded in-process table.

pub mod lock;

pub use lock::LockRepository;
