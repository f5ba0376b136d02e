//! etcd v3 lease store
//!
//! Uses the server-side Lock RPC bound to a lease. The `Client` is cheap to
//! clone and every call works on its own clone.

use async_trait::async_trait;
use etcd_client::{
    Certificate, Client, ConnectOptions, GetOptions, Identity, LockOptions, PutOptions,
    SortOrder, SortTarget, TlsOptions,
};
use tracing::{error, info, warn};

use dlock_common::{DLockError, Result};

use super::store::{LeaseStore, lock_prefix};
use crate::config::{LeaseStoreAuth, LeaseStoreConfig};

const BACKEND: &str = "lease-store";

pub struct EtcdLeaseStore {
    client: Client,
}

impl EtcdLeaseStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect to the cluster and check it answers
    pub async fn connect(config: &LeaseStoreConfig) -> Result<Self> {
        let mut options = ConnectOptions::new().with_connect_timeout(config.dial_timeout());
        if let Some(auth) = &config.auth {
            if !auth.user.is_empty() {
                options = options.with_user(auth.user.clone(), auth.password.clone());
            }
            if auth.has_tls() {
                options = options.with_tls(tls_options(auth).await?);
            }
            if auth.skip_tls_verify {
                warn!("skip_tls_verify is not supported, server certificates are still verified");
            }
        }

        info!(endpoints = ?config.endpoints, "start to connect lease store");
        let client = tokio::time::timeout(
            config.dial_timeout(),
            Client::connect(&config.endpoints, Some(options)),
        )
        .await
        .map_err(|_| connection_error(&"dial timeout elapsed"))?
        .map_err(|e| connection_error(&e))?;

        let store = Self::new(client);
        store
            .ping()
            .await
            .map_err(|e| connection_error(&e))?;
        info!("lease store is reachable");
        Ok(store)
    }
}

async fn tls_options(auth: &LeaseStoreAuth) -> Result<TlsOptions> {
    let mut tls = TlsOptions::new();
    if let Some(ca_file) = &auth.ca_file {
        let pem = read_pem(ca_file).await?;
        tls = tls.ca_certificate(Certificate::from_pem(pem));
    }
    if let (Some(cert_file), Some(key_file)) = (&auth.cert_file, &auth.key_file) {
        let cert = read_pem(cert_file).await?;
        let key = read_pem(key_file).await?;
        tls = tls.identity(Identity::from_pem(cert, key));
    }
    Ok(tls)
}

async fn read_pem(path: &std::path::Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| DLockError::Config(format!("read {} failed: {}", path.display(), e)))
}

fn connection_error(err: &dyn std::fmt::Display) -> DLockError {
    error!("lease store connection failed: {}", err);
    DLockError::Connection {
        backend: BACKEND,
        message: err.to_string(),
    }
}

fn is_lease_not_found(err: &etcd_client::Error) -> bool {
    err.to_string().contains("lease not found")
}

#[async_trait]
impl LeaseStore for EtcdLeaseStore {
    async fn grant(&self, ttl_secs: i64) -> Result<i64> {
        let resp = self
            .client
            .clone()
            .lease_grant(ttl_secs, None)
            .await
            .map_err(|e| DLockError::LeaseGrant(e.to_string()))?;
        Ok(resp.id())
    }

    async fn lock(&self, name: &str, lease_id: i64) -> Result<String> {
        let resp = self
            .client
            .clone()
            .lock(name, Some(LockOptions::new().with_lease(lease_id)))
            .await
            .map_err(|e| DLockError::LockAcquire(e.to_string()))?;
        Ok(String::from_utf8_lossy(resp.key()).into_owned())
    }

    async fn put_owner(&self, lock_key: &str, owner_token: &str, lease_id: i64) -> Result<()> {
        self.client
            .clone()
            .put(
                lock_key,
                owner_token,
                Some(PutOptions::new().with_lease(lease_id)),
            )
            .await
            .map_err(|e| DLockError::store("lease.put", e))?;
        Ok(())
    }

    async fn unlock(&self, lock_key: &str) -> Result<()> {
        self.client
            .clone()
            .unlock(lock_key)
            .await
            .map_err(|e| DLockError::store("lease.unlock", e))?;
        Ok(())
    }

    async fn revoke(&self, lease_id: i64) -> Result<bool> {
        match self.client.clone().lease_revoke(lease_id).await {
            Ok(_) => Ok(true),
            Err(e) if is_lease_not_found(&e) => Ok(false),
            Err(e) => Err(DLockError::store("lease.revoke", e)),
        }
    }

    async fn holder(&self, name: &str) -> Result<Option<String>> {
        let options = GetOptions::new()
            .with_prefix()
            .with_sort(SortTarget::Create, SortOrder::Ascend)
            .with_limit(1);
        let resp = self
            .client
            .clone()
            .get(lock_prefix(name), Some(options))
            .await
            .map_err(|e| DLockError::store("lease.get", e))?;
        Ok(resp
            .kvs()
            .first()
            .map(|kv| String::from_utf8_lossy(kv.value()).into_owned()))
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .clone()
            .status()
            .await
            .map_err(|e| DLockError::store("lease.status", e))?;
        Ok(())
    }
}
