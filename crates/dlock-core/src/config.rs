//! Lock backend configuration
//!
//! A `LockConfig` fixes the backend family and its connection parameters.
//! It is consumed once, when the [`LockClient`](crate::LockClient) is
//! connected. Files are read through the `config` crate and layered under
//! `DLOCK__*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use url::Url;
use validator::{Validate, ValidationErrors};

use dlock_common::{DLockError, LockKind, Result};

/// MySQL standard port
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
/// PostgreSQL standard port
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
/// Default dial timeout for the lease store and the cache
pub const DEFAULT_DIAL_TIMEOUT_MS: u64 = 5000;
/// Default size of the relational connection pool
pub const DEFAULT_MAX_CONNECTIONS: u32 = 25;

const ENV_PREFIX: &str = "DLOCK";

fn default_dial_timeout_ms() -> u64 {
    DEFAULT_DIAL_TIMEOUT_MS
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

/// Backend selection with its strongly typed connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LockConfig {
    Relational(RelationalConfig),
    LeaseStore(LeaseStoreConfig),
    TtlCache(TtlCacheConfig),
}

impl LockConfig {
    /// Load a configuration file, overridden by `DLOCK__*` environment variables
    ///
    /// The file format follows the extension (yaml, toml, json).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("endpoints"),
            )
            .build()
            .map_err(|e| DLockError::Config(e.to_string()))?;

        let config: LockConfig = settings
            .try_deserialize()
            .map_err(|e| DLockError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields of the selected backend
    pub fn validate(&self) -> Result<()> {
        let checked = match self {
            LockConfig::Relational(c) => Validate::validate(c),
            LockConfig::LeaseStore(c) => Validate::validate(c),
            LockConfig::TtlCache(c) => Validate::validate(c),
        };
        checked.map_err(config_error)
    }

    pub fn kind(&self) -> LockKind {
        match self {
            LockConfig::Relational(_) => LockKind::Relational,
            LockConfig::LeaseStore(_) => LockKind::LeaseStore,
            LockConfig::TtlCache(_) => LockKind::TtlCache,
        }
    }
}

impl From<RelationalConfig> for LockConfig {
    fn from(value: RelationalConfig) -> Self {
        LockConfig::Relational(value)
    }
}

impl From<LeaseStoreConfig> for LockConfig {
    fn from(value: LeaseStoreConfig) -> Self {
        LockConfig::LeaseStore(value)
    }
}

impl From<TtlCacheConfig> for LockConfig {
    fn from(value: TtlCacheConfig) -> Self {
        LockConfig::TtlCache(value)
    }
}

/// Join every failed field into one configuration error, `;` separated
fn config_error(errors: ValidationErrors) -> DLockError {
    let mut messages: Vec<String> = errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .map(|e| {
            e.message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| e.code.to_string())
        })
        .collect();
    messages.sort();
    DLockError::Config(messages.join(";"))
}

// ============================================================================
// Relational
// ============================================================================

/// SQL dialect of the relational backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Mysql,
    Postgres,
}

impl DatabaseDriver {
    pub fn scheme(self) -> &'static str {
        match self {
            DatabaseDriver::Mysql => "mysql",
            DatabaseDriver::Postgres => "postgres",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            DatabaseDriver::Mysql => DEFAULT_MYSQL_PORT,
            DatabaseDriver::Postgres => DEFAULT_POSTGRES_PORT,
        }
    }
}

/// Relational backend options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RelationalConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,
    #[serde(default)]
    #[validate(length(min = 1, message = "database user is null"))]
    pub user: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "database password is null"))]
    pub password: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "database host ip is null"))]
    pub host: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "database name is null"))]
    pub database: String,
    /// 0 selects the driver's standard port
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_dial_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl RelationalConfig {
    pub fn new(user: &str, password: &str, host: &str, database: &str) -> Self {
        Self {
            driver: DatabaseDriver::default(),
            user: user.to_string(),
            password: password.to_string(),
            host: host.to_string(),
            database: database.to_string(),
            port: 0,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_ms: DEFAULT_DIAL_TIMEOUT_MS,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_driver(mut self, driver: DatabaseDriver) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            self.driver.default_port()
        } else {
            self.port
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Assemble the connection URL, percent-encoding the credentials
    pub fn connection_url(&self) -> Result<String> {
        let address = format!(
            "{}://{}:{}/{}",
            self.driver.scheme(),
            self.host,
            self.effective_port(),
            self.database
        );
        let mut url = Url::parse(&address)
            .map_err(|e| DLockError::Config(format!("invalid database address: {}", e)))?;
        url.set_username(&self.user)
            .map_err(|_| DLockError::Config("invalid database user".to_string()))?;
        url.set_password(Some(&self.password))
            .map_err(|_| DLockError::Config("invalid database password".to_string()))?;
        Ok(url.to_string())
    }
}

// ============================================================================
// Lease store
// ============================================================================

/// Credentials and TLS material for the lease store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseStoreAuth {
    pub user: String,
    pub password: String,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub skip_tls_verify: bool,
}

impl LeaseStoreAuth {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
            ..Default::default()
        }
    }

    pub fn with_tls(
        mut self,
        ca_file: impl Into<PathBuf>,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        self.ca_file = Some(ca_file.into());
        self.cert_file = Some(cert_file.into());
        self.key_file = Some(key_file.into());
        self
    }

    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    pub fn has_tls(&self) -> bool {
        self.ca_file.is_some() || (self.cert_file.is_some() && self.key_file.is_some())
    }
}

/// Lease-store backend options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LeaseStoreConfig {
    #[serde(default)]
    #[validate(length(min = 1, message = "lease-store cluster is null"))]
    pub endpoints: Vec<String>,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default)]
    pub auth: Option<LeaseStoreAuth>,
}

impl LeaseStoreConfig {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            dial_timeout_ms: DEFAULT_DIAL_TIMEOUT_MS,
            auth: None,
        }
    }

    pub fn with_dial_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.dial_timeout_ms = timeout_ms;
        self
    }

    pub fn with_auth(mut self, auth: LeaseStoreAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}

// ============================================================================
// TTL cache
// ============================================================================

/// TTL cache backend options
///
/// One endpoint selects a single-node client, several select a cluster client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TtlCacheConfig {
    #[serde(default)]
    #[validate(length(min = 1, message = "cache cluster is null"))]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
}

impl TtlCacheConfig {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            password: String::new(),
            dial_timeout_ms: DEFAULT_DIAL_TIMEOUT_MS,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_dial_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.dial_timeout_ms = timeout_ms;
        self
    }

    pub fn is_cluster(&self) -> bool {
        self.endpoints.len() > 1
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// Connection URLs of every endpoint with the password applied
    ///
    /// Bare `host:port` endpoints get the `redis://` scheme.
    pub fn endpoint_urls(&self) -> Result<Vec<String>> {
        self.endpoints
            .iter()
            .map(|endpoint| {
                let address = if endpoint.contains("://") {
                    endpoint.clone()
                } else {
                    format!("redis://{}", endpoint)
                };
                let mut url = Url::parse(&address).map_err(|e| {
                    DLockError::Config(format!("invalid cache endpoint '{}': {}", endpoint, e))
                })?;
                if !self.password.is_empty() {
                    url.set_password(Some(&self.password)).map_err(|_| {
                        DLockError::Config(format!("invalid cache endpoint '{}'", endpoint))
                    })?;
                }
                Ok(url.to_string())
            })
            .collect()
    }
}
