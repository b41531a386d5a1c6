//! Data mappers
//!
//! Each entity gets a mapper that validates, builds statements, runs them
//! through a Unit of Work and converts rows back into domain structs. Every
//! mapper declares its own capability strings and registers them with the
//! RBAC registry when it is constructed, so the policy sits next to the data
//! it protects.
//!
//! Queries are tenant-scoped only on request: with `by_hackathon` set, rows
//! are restricted to the explicit `hackathon` in the options or, failing
//! that, to the single active hackathon.

use ::async_trait::async_trait;
use hackhub_core::{DataError, DataResult, HackathonId};
use hackhub_storage::{QueryOpts, Select, SqlParam};
use serde_json::Value as JsonValue;

use crate::rbac::AclPermissions;

pub mod category;
pub mod hackathon;
pub mod live_update;
pub mod project;

pub use category::CategoryMapper;
pub use hackathon::ActiveHackathonMapper;
pub use live_update::LiveUpdateMapper;
pub use project::ProjectMapper;

/// Tenant table holding the single active row.
pub const HACKATHON_TABLE: &str = "hackathons";

// ============================================================================
// OPTIONS
// ============================================================================

/// Read options shared by every mapper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapperOpts {
    /// Rows to skip
    pub offset: Option<i64>,

    /// Maximum rows to return
    pub count: Option<i64>,

    /// Restrict to one hackathon
    pub by_hackathon: bool,

    /// Hackathon to restrict to; the active one when unset
    pub hackathon: Option<HackathonId>,

    /// Columns to select; every column when unset
    pub fields: Option<Vec<String>>,

    /// Bypass the query cache
    pub ignore_cache: bool,
}

impl MapperOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paginate(mut self, offset: i64, count: i64) -> Self {
        self.offset = Some(offset);
        self.count = Some(count);
        self
    }

    /// Scope to the active hackathon.
    pub fn active_hackathon(mut self) -> Self {
        self.by_hackathon = true;
        self
    }

    /// Scope to `hackathon`.
    pub fn for_hackathon(mut self, hackathon: impl Into<HackathonId>) -> Self {
        self.by_hackathon = true;
        self.hackathon = Some(hackathon.into());
        self
    }

    pub fn uncached(mut self) -> Self {
        self.ignore_cache = true;
        self
    }

    /// Unit of Work options for a read.
    pub fn query_opts(&self) -> QueryOpts {
        QueryOpts {
            cache: !self.ignore_cache,
        }
    }
}

// ============================================================================
// MAPPER CONTRACT
// ============================================================================

/// CRUD contract implemented by every entity mapper.
///
/// `insert` and `update` validate before any statement is issued. Storage
/// errors pass through unchanged.
#[async_trait]
pub trait DataMapper: AclPermissions {
    type Entity: Send + Sync;
    type Id: Send + Sync;

    async fn get(&self, id: &Self::Id, opts: &MapperOpts) -> DataResult<Self::Entity>;

    async fn get_all(&self, opts: &MapperOpts) -> DataResult<Vec<Self::Entity>>;

    async fn get_count(&self, opts: &MapperOpts) -> DataResult<i64>;

    async fn insert(&self, entity: Self::Entity) -> DataResult<Self::Entity>;

    async fn update(&self, entity: Self::Entity) -> DataResult<Self::Entity>;

    async fn delete(&self, id: &Self::Id) -> DataResult<()>;
}

// ============================================================================
// HELPERS
// ============================================================================

/// Restrict `select` to the hackathon named by `opts`, matching on `column`.
///
/// Without an explicit hackathon the active row is resolved inside the same
/// statement.
pub fn scope_to_hackathon(select: Select, column: &str, opts: &MapperOpts) -> Select {
    if !opts.by_hackathon {
        return select;
    }
    match &opts.hackathon {
        Some(hackathon) => select.filter(
            &format!("{} = ?", column),
            vec![SqlParam::Text(hackathon.clone())],
        ),
        None => select.filter(
            &format!(
                "{} = (SELECT \"uid\" FROM \"{}\" WHERE \"active\" = TRUE)",
                column, HACKATHON_TABLE
            ),
            vec![],
        ),
    }
}

/// Apply `offset`, `count` and `fields` from `opts`.
pub fn apply_read_opts(mut select: Select, opts: &MapperOpts) -> Select {
    if let Some(fields) = &opts.fields {
        select = select.columns(fields);
    }
    if let Some(count) = opts.count {
        select = select.limit(count);
    }
    if let Some(offset) = opts.offset {
        select = select.offset(offset);
    }
    select
}

/// First row of a result, deserialized.
pub fn first_row<T: serde::de::DeserializeOwned>(rows: Vec<JsonValue>) -> DataResult<T> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| DataError::not_found("No data was found for this query"))?;
    Ok(serde_json::from_value(row)?)
}

/// Every row, deserialized.
pub fn all_rows<T: serde::de::DeserializeOwned>(rows: Vec<JsonValue>) -> DataResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(DataError::from))
        .collect()
}

/// Value of the `count` column of a `COUNT(..) AS count` query.
pub fn count_from_rows(rows: &[JsonValue]) -> DataResult<i64> {
    rows.first()
        .and_then(|row| row.get("count"))
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| DataError::unknown("Count query returned no count column"))
}
