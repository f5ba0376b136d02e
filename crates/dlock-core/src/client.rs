//! Backend selection and client ownership
//!
//! A [`LockClient`] owns the store client of one backend family. Lock
//! handles created from it share that client; nothing is process-global.

use std::sync::Arc;

use tracing::info;

use dlock_common::{LockKind, Result};
use dlock_persistence::{EmbeddedLockRepository, LockRepository, SqlLockRepository};

use crate::cache::{CacheLock, CacheStore, EmbeddedCacheStore, RedisCacheStore};
use crate::config::LockConfig;
use crate::lease::{EmbeddedLeaseStore, EtcdLeaseStore, LeaseLock, LeaseStore};
use crate::lock::DistributedLock;
use crate::relational::RelationalLock;

/// Connected store client of one backend family
#[derive(Clone)]
pub enum LockClient {
    Relational(Arc<dyn LockRepository>),
    LeaseStore(Arc<dyn LeaseStore>),
    TtlCache(Arc<dyn CacheStore>),
}

impl LockClient {
    /// Validate `config`, connect the selected backend and check it answers
    pub async fn connect(config: &LockConfig) -> Result<Self> {
        config.validate()?;
        info!(backend = %config.kind(), "start to connect lock backend");

        let client = match config {
            LockConfig::Relational(c) => {
                let repository =
                    SqlLockRepository::connect(&c.connection_url()?, c.max_connections, c.connect_timeout())
                        .await?;
                LockClient::Relational(Arc::new(repository))
            }
            LockConfig::LeaseStore(c) => {
                LockClient::LeaseStore(Arc::new(EtcdLeaseStore::connect(c).await?))
            }
            LockConfig::TtlCache(c) => {
                LockClient::TtlCache(Arc::new(RedisCacheStore::connect(c).await?))
            }
        };
        Ok(client)
    }

    /// Client over in-process stores, for tests and single-process use
    pub fn embedded(kind: LockKind) -> Self {
        match kind {
            LockKind::Relational => LockClient::Relational(Arc::new(EmbeddedLockRepository::new())),
            LockKind::LeaseStore => LockClient::LeaseStore(Arc::new(EmbeddedLeaseStore::new())),
            LockKind::TtlCache => LockClient::TtlCache(Arc::new(EmbeddedCacheStore::new())),
        }
    }

    /// A new independent lock handle over this client
    pub fn new_lock(&self) -> Box<dyn DistributedLock> {
        match self {
            LockClient::Relational(repository) => Box::new(RelationalLock::new(repository.clone())),
            LockClient::LeaseStore(store) => Box::new(LeaseLock::new(store.clone())),
            LockClient::TtlCache(store) => Box::new(CacheLock::new(store.clone())),
        }
    }

    pub fn kind(&self) -> LockKind {
        match self {
            LockClient::Relational(_) => LockKind::Relational,
            LockClient::LeaseStore(_) => LockKind::LeaseStore,
            LockClient::TtlCache(_) => LockKind::TtlCache,
        }
    }

    /// Round trip to the backing store
    pub async fn health_check(&self) -> Result<()> {
        match self {
            LockClient::Relational(repository) => repository.health_check().await,
            LockClient::LeaseStore(store) => store.ping().await,
            LockClient::TtlCache(store) => store.ping().await,
        }
    }

    /// Release the backend's connections
    ///
    /// Handles still alive fail their next call on the relational backend.
    pub async fn close(&self) -> Result<()> {
        info!(backend = %self.kind(), "closing lock backend");
        match self {
            LockClient::Relational(repository) => repository.close().await,
            LockClient::LeaseStore(_) | LockClient::TtlCache(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RelationalConfig, TtlCacheConfig};
    use dlock_common::DLockError;

    #[tokio::test]
    async fn test_connect_validates_before_io() {
        let config = LockConfig::from(RelationalConfig::new("", "secret", "127.0.0.1", "dlock"));
        let err = LockClient::connect(&config).await.err().unwrap();
        assert!(matches!(err, DLockError::Config(_)));

        let config = LockConfig::from(TtlCacheConfig::new(Vec::<String>::new()));
        let err = LockClient::connect(&config).await.err().unwrap();
        assert_eq!(err.to_string(), "configuration error: cache cluster is null");
    }

    #[tokio::test]
    async fn test_handles_share_the_store() {
        for kind in [LockKind::Relational, LockKind::LeaseStore, LockKind::TtlCache] {
            let client = LockClient::embedded(kind);
            assert_eq!(client.kind(), kind);
            client.health_check().await.unwrap();

            let first = client.new_lock();
            let second = client.clone().new_lock();
            assert_eq!(first.lock_type(), kind);

            first
                .acquire(std::time::Duration::from_secs(30), "job_id", "token-A", "host1")
                .await
                .unwrap();
            assert!(second.is_locked("job_id").await.unwrap());
            assert_eq!(
                second.get_value("job_id").await.unwrap().as_deref(),
                Some("token-A")
            );
            client.close().await.unwrap();
        }
    }
}
