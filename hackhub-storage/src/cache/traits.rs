//! Cache backend trait and statistics.

use hackhub_core::DataResult;
use serde_json::Value as JsonValue;

use crate::sql::SqlParam;

/// Cache backend consulted by the SQL Unit of Work.
///
/// Implementations must be thread-safe. `get` never fails: a broken backend
/// reports a miss. `set` may fail; the Unit of Work logs and ignores it.
pub trait QueryCache: Send + Sync {
    /// Look up cached rows, promoting the entry to most-recently-used.
    fn get(&self, key: &str) -> Option<Vec<JsonValue>>;

    /// Store rows under `key`, evicting the least-recently-used entry at
    /// capacity.
    fn set(&self, key: &str, rows: Vec<JsonValue>) -> DataResult<()>;

    /// Globally enable or disable the cache. Disabling keeps existing
    /// entries so that re-enabling resumes with the prior state.
    fn set_global_flag(&self, enabled: bool);

    /// Usage counters.
    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (including lookups while disabled).
    pub misses: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache key for a statement and its bound parameters.
///
/// Parameters are serialized as a JSON array so that `["ab", "c"]` and
/// `["a", "bc"]` never collide.
pub fn fingerprint(statement: &str, params: &[SqlParam]) -> String {
    let encoded = serde_json::to_string(params).unwrap_or_else(|_| format!("{:?}", params));
    format!("{}{}", statement, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_fingerprint_separates_params() {
        let a = fingerprint(
            "SELECT 1",
            &[SqlParam::Text("ab".into()), SqlParam::Text("c".into())],
        );
        let b = fingerprint(
            "SELECT 1",
            &[SqlParam::Text("a".into()), SqlParam::Text("bc".into())],
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let params = [SqlParam::Int(4), SqlParam::Bool(true)];
        assert_eq!(fingerprint("SELECT $1", &params), fingerprint("SELECT $1", &params));
        assert_ne!(fingerprint("SELECT $1", &params), fingerprint("SELECT $2", &params));
    }
}
