//! SQL driver seam.
//!
//! The Unit of Work only talks to these traits. [`super::PgPool`] implements
//! them over deadpool-postgres; tests substitute a scripted fake.

use ::async_trait::async_trait;
use hackhub_core::DataResult;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::param::SqlParam;

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Configured maximum number of connections
    pub max_size: usize,
    /// Connections that could be handed out right now without waiting
    pub available: usize,
}

/// A bounded pool of connections.
#[async_trait]
pub trait SqlPool: Send + Sync {
    /// Acquire a connection, waiting up to the pool timeout.
    ///
    /// A timeout or a closed pool is reported as UNAVAILABLE.
    async fn acquire(&self) -> DataResult<Box<dyn SqlConnection>>;

    /// Current occupancy.
    fn status(&self) -> PoolStatus;
}

/// One pooled connection. Dropping it returns it to the pool.
///
/// Errors returned by these methods are already translated into the
/// canonical taxonomy.
#[async_trait]
pub trait SqlConnection: Send {
    async fn begin(&mut self) -> DataResult<()>;

    /// Execute one statement with bound parameters, returning each row as a
    /// JSON object keyed by column name.
    async fn execute(&mut self, statement: &str, params: &[SqlParam]) -> DataResult<Vec<JsonValue>>;

    async fn commit(&mut self) -> DataResult<()>;

    async fn rollback(&mut self) -> DataResult<()>;
}
