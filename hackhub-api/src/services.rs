//! Service wiring
//!
//! Builds the RBAC registry, both Units of Work and every mapper once at
//! startup. Mappers register their capabilities while being constructed, so
//! the registry is complete as soon as [`Services::new`] returns.

use std::sync::Arc;

use hackhub_core::DataResult;
use hackhub_storage::{
    LruQueryCache, PgPool, QueryCache, RestTreeStore, SqlPool, SqlUow, TreeStore, TreeUow,
};
use serde_json::Value as JsonValue;

use crate::auth::{verify_acl, AuthContext};
use crate::config::AppConfig;
use crate::mappers::{ActiveHackathonMapper, CategoryMapper, LiveUpdateMapper, ProjectMapper};
use crate::rbac::{AclOperation, AclPermissions, Rbac};

/// Everything a request handler needs, shared behind an `Arc`.
pub struct Services {
    pub rbac: Arc<Rbac>,
    pub sql: SqlUow,
    pub tree: TreeUow,
    pub hackathons: Arc<ActiveHackathonMapper>,
    pub categories: CategoryMapper,
    pub projects: ProjectMapper,
    pub live_updates: LiveUpdateMapper,
}

impl Services {
    pub fn new(
        pool: Arc<dyn SqlPool>,
        cache: Arc<dyn QueryCache>,
        tree_store: Arc<dyn TreeStore>,
    ) -> Self {
        let rbac = Arc::new(Rbac::new());
        let sql = SqlUow::new(pool, cache);
        let tree = TreeUow::new(tree_store);

        let hackathons = Arc::new(ActiveHackathonMapper::new(&rbac, sql.clone()));
        let categories = CategoryMapper::new(&rbac, sql.clone());
        let projects = ProjectMapper::new(&rbac, sql.clone(), Arc::clone(&hackathons));
        let live_updates = LiveUpdateMapper::new(&rbac, tree.clone(), Arc::clone(&hackathons));

        tracing::debug!(roles = %rbac.describe(), "RBAC registry built");

        Self {
            rbac,
            sql,
            tree,
            hackathons,
            categories,
            projects,
            live_updates,
        }
    }

    /// Connect to Postgres and the hierarchical store described by `config`.
    pub fn from_config(config: &AppConfig) -> DataResult<Self> {
        let pool = PgPool::from_config(&config.db)?;
        let cache = LruQueryCache::from_config(&config.cache);
        let tree_store = RestTreeStore::new(&config.tree)?;
        tracing::info!(
            db_host = %config.db.host,
            db_name = %config.db.dbname,
            cache_capacity = config.cache.capacity,
            tree_url = %config.tree.url,
            "Services configured"
        );
        Ok(Self::new(Arc::new(pool), Arc::new(cache), Arc::new(tree_store)))
    }

    /// Authorize `ctx` for `operations` on the mapper declaring `permissions`.
    pub fn verify(
        &self,
        permissions: &dyn AclPermissions,
        operations: &[AclOperation],
        ctx: &AuthContext,
        params: Option<&JsonValue>,
    ) -> DataResult<()> {
        verify_acl(&self.rbac, permissions, operations, ctx, params)
    }
}
