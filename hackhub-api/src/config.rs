//! Application configuration
//!
//! Aggregates the storage configs and the logging config. Every section reads
//! its own environment variables with documented defaults.

use hackhub_storage::{CacheConfig, DbConfig, TreeStoreConfig};

use crate::telemetry::LogConfig;

/// Configuration for the whole backend core.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Postgres connection and pool settings (`HACKHUB_DB_*`)
    pub db: DbConfig,
    /// Query cache settings (`HACKHUB_CACHE_*`)
    pub cache: CacheConfig,
    /// Hierarchical store settings (`HACKHUB_RTDB_*`)
    pub tree: TreeStoreConfig,
    /// Logging settings (`HACKHUB_LOG_FORMAT`, `HACKHUB_SERVICE_NAME`)
    pub log: LogConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            db: DbConfig::from_env(),
            cache: CacheConfig::from_env(),
            tree: TreeStoreConfig::from_env(),
            log: LogConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sections_match_their_own_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.log, LogConfig::default());
        assert_eq!(config.cache.capacity, CacheConfig::default().capacity);
        assert_eq!(config.db.max_size, DbConfig::default().max_size);
    }
}
