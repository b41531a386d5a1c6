//! HackHub Storage
//!
//! The data-access core shared by every mapper:
//!
//! - [`cache`]: bounded LRU cache consulted by SQL reads that opt in.
//! - [`sql`]: parameterised statement builder, the driver seam, the Postgres
//!   driver and the SQL Unit of Work.
//! - [`tree`]: the path-addressed hierarchical store seam, its in-memory and
//!   REST implementations, and the hierarchical Unit of Work.
//!
//! Every failure leaving this crate is a [`hackhub_core::DataError`] whose
//! kind was decided here.

pub mod cache;
pub mod config;
pub mod sql;
pub mod tree;

pub use cache::{fingerprint, CacheStats, LruQueryCache, QueryCache, DEFAULT_CACHE_CAPACITY};
pub use config::{CacheConfig, DbConfig, TreeStoreConfig};
pub use sql::{
    quote_ident, Delete, Insert, LockMode, PgPool, PoolStatus, QueryOpts, Select, SqlConnection,
    SqlParam, SqlPool, SqlUow, Statement, UowHandle, Update,
};
pub use tree::{
    InMemoryTreeStore, RestTreeStore, TreeChild, TreeOutput, TreePath, TreeQuery, TreeStore,
    TreeUow,
};
