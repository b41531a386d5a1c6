//! SQL Unit of Work.
//!
//! One call, one connection, one transaction. The call commits or rolls back
//! before it returns, and the body runs on its own task so a caller that
//! stops polling does not abandon a half-finished transaction.

use std::sync::Arc;

use hackhub_core::{DataError, DataResult, ErrorKind};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use super::builder::Statement;
use super::driver::{PoolStatus, SqlConnection, SqlPool};
use super::param::SqlParam;
use crate::cache::{fingerprint, QueryCache};

/// Per-call options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOpts {
    /// Consult and populate the query cache.
    pub cache: bool,
}

impl QueryOpts {
    pub fn cached() -> Self {
        Self { cache: true }
    }
}

/// Unit of Work over a pooled SQL store.
#[derive(Clone)]
pub struct SqlUow {
    pool: Arc<dyn SqlPool>,
    cache: Arc<dyn QueryCache>,
}

impl SqlUow {
    pub fn new(pool: Arc<dyn SqlPool>, cache: Arc<dyn QueryCache>) -> Self {
        Self { pool, cache }
    }

    /// Run one statement in its own transaction.
    ///
    /// Zero rows is reported as NOT_FOUND. With `opts.cache`, a cache hit
    /// returns without starting a transaction.
    pub async fn query(
        &self,
        statement: &str,
        params: &[SqlParam],
        opts: QueryOpts,
    ) -> DataResult<Vec<JsonValue>> {
        let pool = Arc::clone(&self.pool);
        let cache = Arc::clone(&self.cache);
        let statement = statement.to_string();
        let params = params.to_vec();

        let task = tokio::spawn(async move { run_query(pool, cache, statement, params, opts).await });
        match task.await {
            Ok(result) => result,
            Err(e) => Err(DataError::unknown("Query task failed").with_detail(e.to_string())),
        }
    }

    /// [`SqlUow::query`] for a built statement.
    pub async fn execute(&self, statement: &Statement, opts: QueryOpts) -> DataResult<Vec<JsonValue>> {
        self.query(&statement.text, &statement.params, opts).await
    }

    /// Run a statement and deserialize each row.
    pub async fn query_as<T: DeserializeOwned>(
        &self,
        statement: &Statement,
        opts: QueryOpts,
    ) -> DataResult<Vec<T>> {
        let rows = self.execute(statement, opts).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(DataError::from))
            .collect()
    }

    /// Open a handle for several statements in one transaction.
    pub async fn begin(&self) -> DataResult<UowHandle> {
        let connection = self.pool.acquire().await?;
        Ok(UowHandle {
            connection: Some(connection),
            in_transaction: false,
        })
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.cache
    }
}

async fn run_query(
    pool: Arc<dyn SqlPool>,
    cache: Arc<dyn QueryCache>,
    statement: String,
    params: Vec<SqlParam>,
    opts: QueryOpts,
) -> DataResult<Vec<JsonValue>> {
    let mut connection = pool.acquire().await.map_err(|e| log_failure(&statement, e))?;

    let key = opts.cache.then(|| fingerprint(&statement, &params));
    if let Some(key) = &key {
        if let Some(rows) = cache.get(key) {
            tracing::debug!(statement = %statement, "served request from query cache");
            return Ok(rows);
        }
    }

    connection.begin().await.map_err(|e| log_failure(&statement, e))?;

    let rows = match connection.execute(&statement, &params).await {
        Ok(rows) => rows,
        Err(e) => {
            if let Err(rollback) = connection.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            return Err(log_failure(&statement, e));
        }
    };

    connection.commit().await.map_err(|e| log_failure(&statement, e))?;
    drop(connection);

    if rows.is_empty() {
        tracing::debug!(statement = %statement, "statement returned no rows");
        return Err(DataError::from_kind(ErrorKind::NotFound).with_detail(statement));
    }

    if let Some(key) = key {
        if let Err(e) = cache.set(&key, rows.clone()) {
            tracing::warn!(error = %e, "failed to write query cache");
        }
    }

    Ok(rows)
}

fn log_failure(statement: &str, err: DataError) -> DataError {
    tracing::error!(
        kind = %err.kind,
        detail = err.detail.as_deref().unwrap_or(""),
        statement = %statement,
        "sql statement failed"
    );
    err
}

// ============================================================================
// HANDLE
// ============================================================================

/// A connection held across several statements.
///
/// The first statement opens the transaction. `commit` keeps the connection
/// for further statements, `complete` commits and releases it, `rollback`
/// discards. A handle dropped with an open transaction is rolled back on a
/// background task before the connection returns to the pool.
pub struct UowHandle {
    connection: Option<Box<dyn SqlConnection>>,
    in_transaction: bool,
}

impl UowHandle {
    fn connection(&mut self) -> DataResult<&mut Box<dyn SqlConnection>> {
        self.connection
            .as_mut()
            .ok_or_else(|| DataError::unknown("Unit of Work handle already released"))
    }

    /// Execute within the handle's transaction. Zero rows is NOT_FOUND; any
    /// failure rolls the transaction back.
    pub async fn query(&mut self, statement: &Statement) -> DataResult<Vec<JsonValue>> {
        if !self.in_transaction {
            self.connection()?.begin().await?;
            self.in_transaction = true;
        }
        let result = self.connection()?.execute(&statement.text, &statement.params).await;
        match result {
            Ok(rows) if rows.is_empty() => {
                Err(DataError::from_kind(ErrorKind::NotFound).with_detail(statement.text.clone()))
            }
            Ok(rows) => Ok(rows),
            Err(e) => {
                self.in_transaction = false;
                if let Err(rollback) = self.connection()?.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(log_failure(&statement.text, e))
            }
        }
    }

    /// Commit the open transaction, keeping the connection.
    pub async fn commit(&mut self) -> DataResult<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.connection()?.commit().await?;
        }
        Ok(())
    }

    /// Commit and release the connection.
    pub async fn complete(mut self) -> DataResult<()> {
        self.commit().await?;
        self.connection.take();
        Ok(())
    }

    /// Roll back and release the connection.
    pub async fn rollback(mut self) -> DataResult<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.connection()?.rollback().await?;
        }
        self.connection.take();
        Ok(())
    }
}

impl Drop for UowHandle {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        if let Some(mut connection) = self.connection.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = connection.rollback().await {
                            tracing::warn!(error = %e, "rollback of dropped handle failed");
                        }
                    });
                }
                Err(_) => tracing::warn!("handle dropped outside a runtime with an open transaction"),
            }
        }
    }
}
