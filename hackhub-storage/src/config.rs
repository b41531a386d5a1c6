//! Storage configuration
//!
//! Every struct has a `Default` suitable for local development and a
//! `from_env()` constructor reading `HACKHUB_*` variables.

use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use hackhub_core::{DataError, DataResult, ErrorKind};
use tokio_postgres::NoTls;

use crate::cache::DEFAULT_CACHE_CAPACITY;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// RELATIONAL STORE
// ============================================================================

/// Postgres connection and pool settings.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create timeout for acquiring a connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "hackhub".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Read `HACKHUB_DB_*`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HACKHUB_DB_HOST").unwrap_or(defaults.host),
            port: env_or("HACKHUB_DB_PORT", defaults.port),
            dbname: std::env::var("HACKHUB_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("HACKHUB_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("HACKHUB_DB_PASSWORD").unwrap_or_default(),
            max_size: env_or("HACKHUB_DB_POOL_SIZE", defaults.max_size),
            timeout: Duration::from_secs(env_or("HACKHUB_DB_TIMEOUT", 30)),
        }
    }

    /// Build the deadpool pool.
    ///
    /// The wait timeout bounds how long a caller queues for a free
    /// connection; exceeding it surfaces as UNAVAILABLE.
    pub fn create_pool(&self) -> DataResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig {
            max_size: self.max_size.max(1),
            timeouts: Timeouts {
                wait: Some(self.timeout),
                create: Some(self.timeout),
                recycle: Some(self.timeout),
            },
            ..Default::default()
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            DataError::new(ErrorKind::Unavailable, "Failed to create connection pool")
                .with_detail(e.to_string())
        })
    }
}

// ============================================================================
// QUERY CACHE
// ============================================================================

/// Query cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached statements
    pub capacity: usize,
    /// Whether the cache starts enabled
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            enabled: true,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            capacity: env_or("HACKHUB_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY),
            enabled: env_or("HACKHUB_CACHE_ENABLED", true),
        }
    }
}

// ============================================================================
// HIERARCHICAL STORE
// ============================================================================

/// Realtime-database (hierarchical store) client configuration.
#[derive(Debug, Clone)]
pub struct TreeStoreConfig {
    /// Base URL, e.g. `https://project.firebaseio.com`
    pub url: String,
    /// Optional database secret or access token appended as `auth=`
    pub auth: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Attempts for the conditional-write loop before giving up
    pub max_retries: u32,
}

impl Default for TreeStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9000".to_string(),
            auth: None,
            request_timeout: Duration::from_secs(10),
            max_retries: 25,
        }
    }
}

impl TreeStoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("HACKHUB_RTDB_URL").unwrap_or(defaults.url),
            auth: std::env::var("HACKHUB_RTDB_AUTH").ok().filter(|s| !s.is_empty()),
            request_timeout: Duration::from_secs(env_or("HACKHUB_RTDB_TIMEOUT", 10)),
            max_retries: env_or("HACKHUB_RTDB_MAX_RETRIES", defaults.max_retries),
        }
    }
}
