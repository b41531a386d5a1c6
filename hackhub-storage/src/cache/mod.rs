//! In-process query cache.
//!
//! SQL reads that pass `QueryOpts { cache: true }` are keyed by a
//! [`fingerprint`] of the statement text and its serialized parameters. There
//! is no time-based expiry and writes do not invalidate entries: callers that
//! opt into caching accept stale rows. Entries leave only under LRU pressure.

pub mod lru_cache;
pub mod traits;

pub use lru_cache::{BoundedLru, LruQueryCache, DEFAULT_CACHE_CAPACITY};
pub use traits::{fingerprint, CacheStats, QueryCache};
