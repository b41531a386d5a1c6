//! Postgres driver over deadpool-postgres.

use ::async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use deadpool_postgres::{Object, Pool};
use hackhub_core::{DataError, DataResult};
use serde_json::{Map, Value as JsonValue};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;

use super::driver::{PoolStatus, SqlConnection, SqlPool};
use super::error::{from_pg_error, from_pool_error};
use super::param::SqlParam;
use crate::config::DbConfig;

/// [`SqlPool`] backed by a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgPool {
    pool: Pool,
}

impl PgPool {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a pool from configuration.
    pub fn from_config(config: &DbConfig) -> DataResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }
}

#[async_trait]
impl SqlPool for PgPool {
    async fn acquire(&self) -> DataResult<Box<dyn SqlConnection>> {
        let client = self.pool.get().await.map_err(from_pool_error)?;
        Ok(Box::new(PgConnection { client }))
    }

    fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        let checked_out = status.size.saturating_sub(status.available);
        PoolStatus {
            max_size: status.max_size,
            available: status.max_size.saturating_sub(checked_out),
        }
    }
}

/// A checked-out connection. Returned to the pool on drop.
pub struct PgConnection {
    client: Object,
}

#[async_trait]
impl SqlConnection for PgConnection {
    async fn begin(&mut self) -> DataResult<()> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| from_pg_error(&e))
    }

    async fn execute(&mut self, statement: &str, params: &[SqlParam]) -> DataResult<Vec<JsonValue>> {
        let prepared = self
            .client
            .prepare_cached(statement)
            .await
            .map_err(|e| from_pg_error(&e))?;
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(SqlParam::as_to_sql).collect();
        let rows = self
            .client
            .query(&prepared, &bound)
            .await
            .map_err(|e| from_pg_error(&e))?;
        rows.iter().map(row_to_json).collect()
    }

    async fn commit(&mut self) -> DataResult<()> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| from_pg_error(&e))
    }

    async fn rollback(&mut self) -> DataResult<()> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| from_pg_error(&e))
    }
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

/// Convert a row into a JSON object keyed by column name.
pub fn row_to_json(row: &Row) -> DataResult<JsonValue> {
    let mut object = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_to_json(row, idx, column.type_()).map_err(|e| {
            DataError::unknown("Failed to decode column")
                .with_detail(format!("column {}: {}", column.name(), e))
        })?;
        object.insert(column.name().to_string(), value);
    }
    Ok(JsonValue::Object(object))
}

fn opt<T: Into<JsonValue>>(value: Option<T>) -> JsonValue {
    value.map(Into::into).unwrap_or(JsonValue::Null)
}

fn column_to_json(row: &Row, idx: usize, ty: &Type) -> Result<JsonValue, tokio_postgres::Error> {
    let value = if *ty == Type::BOOL {
        opt(row.try_get::<_, Option<bool>>(idx)?)
    } else if *ty == Type::INT2 {
        opt(row.try_get::<_, Option<i16>>(idx)?)
    } else if *ty == Type::INT4 {
        opt(row.try_get::<_, Option<i32>>(idx)?)
    } else if *ty == Type::INT8 {
        opt(row.try_get::<_, Option<i64>>(idx)?)
    } else if *ty == Type::FLOAT4 {
        opt(row.try_get::<_, Option<f32>>(idx)?)
    } else if *ty == Type::FLOAT8 {
        opt(row.try_get::<_, Option<f64>>(idx)?)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<JsonValue>>(idx)?
            .unwrap_or(JsonValue::Null)
    } else if *ty == Type::TIMESTAMPTZ {
        opt(row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|t| t.to_rfc3339()))
    } else if *ty == Type::TIMESTAMP {
        opt(row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|t| t.and_utc().to_rfc3339()))
    } else if *ty == Type::INT4_ARRAY {
        opt(row.try_get::<_, Option<Vec<i32>>>(idx)?)
    } else if *ty == Type::INT8_ARRAY {
        opt(row.try_get::<_, Option<Vec<i64>>>(idx)?)
    } else if *ty == Type::TEXT_ARRAY || *ty == Type::VARCHAR_ARRAY {
        opt(row.try_get::<_, Option<Vec<String>>>(idx)?)
    } else {
        // TEXT, VARCHAR, BPCHAR, NAME and anything else with a text
        // representation; other types fail with a WrongType error.
        opt(row.try_get::<_, Option<String>>(idx)?)
    };
    Ok(value)
}
