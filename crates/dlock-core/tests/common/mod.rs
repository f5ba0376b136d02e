//! Live backend test utilities
//!
//! Endpoints come from the environment; the tests using them are ignored by default.

use std::env;

use dlock_core::{LeaseStoreConfig, LockConfig, RelationalConfig, TtlCacheConfig};

/// Unique lock key so reruns against a shared store do not collide
pub fn unique_key(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

fn endpoints(var: &str, default: &str) -> Vec<String> {
    env::var(var)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// MySQL from `TEST_DLOCK_MYSQL_*`, defaulting to the docker test environment
pub fn relational_config() -> LockConfig {
    let var = |name: &str, default: &str| env::var(name).unwrap_or_else(|_| default.to_string());
    let port = var("TEST_DLOCK_MYSQL_PORT", "3307").parse().unwrap_or(3307);
    RelationalConfig::new(
        &var("TEST_DLOCK_MYSQL_USER", "dlock"),
        &var("TEST_DLOCK_MYSQL_PASSWORD", "dlock"),
        &var("TEST_DLOCK_MYSQL_HOST", "127.0.0.1"),
        &var("TEST_DLOCK_MYSQL_DATABASE", "dlock_test"),
    )
    .with_port(port)
    .into()
}

pub fn lease_store_config() -> LockConfig {
    LeaseStoreConfig::new(endpoints("TEST_DLOCK_ETCD_ENDPOINTS", "127.0.0.1:2379"))
        .with_dial_timeout_ms(3000)
        .into()
}

pub fn ttl_cache_config() -> LockConfig {
    let password = env::var("TEST_DLOCK_REDIS_PASSWORD").unwrap_or_default();
    TtlCacheConfig::new(endpoints("TEST_DLOCK_REDIS_ENDPOINTS", "127.0.0.1:6379"))
        .with_password(&password)
        .with_dial_timeout_ms(3000)
        .into()
}
