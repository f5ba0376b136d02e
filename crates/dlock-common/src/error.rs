//! Error types for dlock
//!
//! Every backend reports through `DLockError`. The variants follow the
//! failure taxonomy of the lock contract:
//! - configuration errors, raised before any network I/O
//! - connectivity errors from the initial handshake with a store
//! - contention and ownership errors
//! - store/driver errors, carried verbatim with the failing operation

/// Boxed driver error carried by [`DLockError::Store`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum DLockError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("connect to {backend} failed: {message}")]
    Connection {
        backend: &'static str,
        message: String,
    },

    #[error("{0} is already exists")]
    AlreadyExists(String),

    #[error("lock '{key}' is not held by owner '{owner}'")]
    NotOwner { key: String, owner: String },

    #[error("no lease session held for '{0}'")]
    SessionNotFound(String),

    #[error("lease of lock '{0}' already expired")]
    LeaseExpired(String),

    #[error("lease grant failed: {0}")]
    LeaseGrant(String),

    #[error("lock acquire failed: {0}")]
    LockAcquire(String),

    #[error("{operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl DLockError {
    /// Wrap a driver error, naming the operation that produced it
    pub fn store<E>(operation: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        DLockError::Store {
            operation,
            source: source.into(),
        }
    }

    /// True for the relational backend's contention signal
    pub fn is_already_exists(&self) -> bool {
        matches!(self, DLockError::AlreadyExists(_))
    }
}

pub type Result<T> = std::result::Result<T, DLockError>;
