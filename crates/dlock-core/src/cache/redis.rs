//! Redis cache store
//!
//! One endpoint uses a multiplexed single-node connection, several use a
//! cluster connection. Both are cloned per command.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{Client, FromRedisValue, RedisResult, Script};
use tokio::time::timeout;
use tracing::{error, info};

use dlock_common::{DLockError, Result};

use super::store::{CacheStore, CompareDelete};
use crate::config::TtlCacheConfig;

const BACKEND: &str = "ttl-cache";

/// Deletes KEYS[1] only while it holds ARGV[1]; replies 1, 0 (absent) or -1 (other owner)
const COMPARE_AND_DELETE: &str = r"
local v = redis.call('GET', KEYS[1])
if not v then
    return 0
end
if v == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return -1
";

#[derive(Clone)]
enum CacheConnection {
    Single(MultiplexedConnection),
    Cluster(ClusterConnection),
}

pub struct RedisCacheStore {
    connection: CacheConnection,
    compare_and_delete: Script,
}

impl RedisCacheStore {
    /// Connect to the configured endpoints and `PING` them
    pub async fn connect(config: &TtlCacheConfig) -> Result<Self> {
        let urls = config.endpoint_urls()?;
        info!(
            endpoints = ?config.endpoints,
            cluster = config.is_cluster(),
            "start to connect ttl cache"
        );

        let connection = timeout(config.dial_timeout(), dial(urls, config.is_cluster()))
            .await
            .map_err(|_| connection_error(&"dial timeout elapsed"))?
            .map_err(|e| connection_error(&e))?;

        let store = Self {
            connection,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        };
        store.ping().await.map_err(|e| connection_error(&e))?;
        info!("ttl cache is reachable");
        Ok(store)
    }

    async fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> RedisResult<T> {
        match &self.connection {
            CacheConnection::Single(conn) => cmd.query_async(&mut conn.clone()).await,
            CacheConnection::Cluster(conn) => cmd.query_async(&mut conn.clone()).await,
        }
    }
}

async fn dial(urls: Vec<String>, cluster: bool) -> RedisResult<CacheConnection> {
    if cluster {
        let client = ClusterClient::new(urls)?;
        return client
            .get_async_connection()
            .await
            .map(CacheConnection::Cluster);
    }
    let url = urls.first().map(String::as_str).unwrap_or_default();
    let client = Client::open(url)?;
    client
        .get_multiplexed_async_connection()
        .await
        .map(CacheConnection::Single)
}

fn connection_error(err: &dyn std::fmt::Display) -> DLockError {
    error!("ttl cache connection failed: {}", err);
    DLockError::Connection {
        backend: BACKEND,
        message: err.to_string(),
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        // PX needs at least one millisecond
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let reply: Option<String> = self
            .query(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms),
            )
            .await
            .map_err(|e| DLockError::store("cache.set", e))?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.query(redis::cmd("GET").arg(key))
            .await
            .map_err(|e| DLockError::store("cache.get", e))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let count: i64 = self
            .query(redis::cmd("EXISTS").arg(key))
            .await
            .map_err(|e| DLockError::store("cache.exists", e))?;
        Ok(count > 0)
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        self.query(redis::cmd("DEL").arg(key))
            .await
            .map_err(|e| DLockError::store("cache.del", e))
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<CompareDelete> {
        let mut invocation = self.compare_and_delete.key(key);
        invocation.arg(value);
        let reply: RedisResult<i64> = match &self.connection {
            CacheConnection::Single(conn) => invocation.invoke_async(&mut conn.clone()).await,
            CacheConnection::Cluster(conn) => invocation.invoke_async(&mut conn.clone()).await,
        };
        reply
            .map(CompareDelete::from_reply)
            .map_err(|e| DLockError::store("cache.compare_and_delete", e))
    }

    async fn ping(&self) -> Result<()> {
        let pong: String = self
            .query(&redis::cmd("PING"))
            .await
            .map_err(|e| DLockError::store("cache.ping", e))?;
        if pong != "PONG" {
            return Err(DLockError::store(
                "cache.ping",
                format!("unexpected reply: {}", pong),
            ));
        }
        Ok(())
    }
}
