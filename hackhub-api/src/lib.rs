//! HackHub API - Authorization and Entity Mappers
//!
//! This crate sits between the HTTP routes and storage. It owns the RBAC
//! registry, the schema checks run before every write, and one data mapper
//! per entity. Mappers turn domain structs into statements for the SQL or
//! hierarchical Unit of Work in `hackhub-storage` and convert the rows back.
//!
//! Storage failures stay [`hackhub_core::DataError`] until they reach the
//! HTTP edge, where [`ApiError`] maps each kind to a status code.

pub mod auth;
pub mod config;
pub mod error;
pub mod mappers;
pub mod rbac;
pub mod services;
pub mod telemetry;
pub mod validation;

// Re-export commonly used types
pub use auth::{verify_acl, AuthContext};
pub use config::AppConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use mappers::{
    ActiveHackathonMapper, CategoryMapper, DataMapper, LiveUpdateMapper, MapperOpts,
    ProjectMapper,
};
pub use rbac::{add_rbac, AclOperation, AclPermissions, CrudPermissions, Rbac, Role, RolePredicate};
pub use services::Services;
pub use telemetry::{init_logging, LogConfig, LogFormat};
pub use validation::EntitySchema;
