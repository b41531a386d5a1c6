//! Relational store access.

pub mod builder;
pub mod driver;
pub mod error;
pub mod param;
pub mod postgres;
pub mod uow;

pub use builder::{quote_ident, Delete, Insert, LockMode, Select, Statement, Update};
pub use driver::{PoolStatus, SqlConnection, SqlPool};
pub use param::SqlParam;
pub use postgres::{PgConnection, PgPool};
pub use uow::{QueryOpts, SqlUow, UowHandle};
