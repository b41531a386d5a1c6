//! Category mapper
//!
//! Judging categories are global: they are not tenant-scoped.

use ::async_trait::async_trait;
use hackhub_core::{AuthLevel, Category, CategoryId, DataError, DataResult};
use hackhub_storage::{Delete, Insert, QueryOpts, Select, SqlParam, SqlUow, Update};

use super::{all_rows, apply_read_opts, count_from_rows, first_row, DataMapper, MapperOpts};
use crate::rbac::{add_rbac, AclOperation, AclPermissions, CrudPermissions, Rbac};
use crate::validation::CATEGORY_SCHEMA;

pub const CATEGORY_TABLE: &str = "categories";

pub struct CategoryMapper {
    uow: SqlUow,
    permissions: CrudPermissions,
}

impl CategoryMapper {
    pub fn new(rbac: &Rbac, uow: SqlUow) -> Self {
        let permissions = CrudPermissions::for_prefix("category");
        add_rbac(
            rbac,
            &[
                permissions.read.as_str(),
                permissions.read_all.as_str(),
                permissions.count.as_str(),
            ],
            &[AuthLevel::TeamMember],
            None,
            &[],
        );
        add_rbac(
            rbac,
            &[
                permissions.create.as_str(),
                permissions.update.as_str(),
                permissions.delete.as_str(),
            ],
            &[AuthLevel::Director],
            None,
            &[AuthLevel::TeamMember],
        );
        Self { uow, permissions }
    }
}

impl AclPermissions for CategoryMapper {
    fn permission(&self, operation: AclOperation) -> Option<&str> {
        self.permissions.permission(operation)
    }
}

#[async_trait]
impl DataMapper for CategoryMapper {
    type Entity = Category;
    type Id = CategoryId;

    async fn get(&self, id: &CategoryId, opts: &MapperOpts) -> DataResult<Category> {
        let mut select = Select::from(CATEGORY_TABLE);
        if let Some(fields) = &opts.fields {
            select = select.columns(fields);
        }
        let stmt = select.filter("\"uid\" = ?", vec![SqlParam::Int(*id)]).build();
        first_row(self.uow.execute(&stmt, opts.query_opts()).await?)
    }

    async fn get_all(&self, opts: &MapperOpts) -> DataResult<Vec<Category>> {
        let select = Select::from(CATEGORY_TABLE).order_by("\"uid\"");
        let stmt = apply_read_opts(select, opts).build();
        all_rows(self.uow.execute(&stmt, opts.query_opts()).await?)
    }

    async fn get_count(&self, opts: &MapperOpts) -> DataResult<i64> {
        let stmt = Select::from(CATEGORY_TABLE)
            .expr("COUNT(\"uid\") AS count")
            .build();
        count_from_rows(&self.uow.execute(&stmt, opts.query_opts()).await?)
    }

    async fn insert(&self, category: Category) -> DataResult<Category> {
        CATEGORY_SCHEMA.validate(&category)?;
        let stmt = Insert::into(CATEGORY_TABLE)
            .value("category_name", category.category_name.as_str())
            .value("is_sponsor", category.is_sponsor)
            .returning(&["*"])
            .build();
        first_row(self.uow.execute(&stmt, QueryOpts::default()).await?)
    }

    async fn update(&self, category: Category) -> DataResult<Category> {
        CATEGORY_SCHEMA.validate(&category)?;
        let uid = category
            .uid
            .ok_or_else(|| DataError::validation("uid is required to update a category"))?;
        let stmt = Update::table(CATEGORY_TABLE)
            .set("category_name", category.category_name.as_str())
            .set("is_sponsor", category.is_sponsor)
            .filter("\"uid\" = ?", vec![SqlParam::Int(uid)])
            .returning(&["*"])
            .build();
        first_row(self.uow.execute(&stmt, QueryOpts::default()).await?)
    }

    async fn delete(&self, id: &CategoryId) -> DataResult<()> {
        let stmt = Delete::from(CATEGORY_TABLE)
            .filter("\"uid\" = ?", vec![SqlParam::Int(*id)])
            .returning(&["uid"])
            .build();
        self.uow.execute(&stmt, QueryOpts::default()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hackhub_core::ErrorKind;
    use hackhub_test_utils::{fixtures, scripted_uow, ScriptedPool};
    use serde_json::json;

    #[test]
    fn test_team_members_read_directors_write() {
        let rbac = Rbac::new();
        let _mapper = CategoryMapper::new(&rbac, scripted_uow(&ScriptedPool::new(1)));
        assert!(rbac.can("TEAM_MEMBER", "category:readall", None));
        assert!(!rbac.can("PARTICIPANT", "category:read", None));
        assert!(rbac.can("DIRECTOR", "category:create", None));
        assert!(rbac.can("DIRECTOR", "category:read", None));
    }

    #[tokio::test]
    async fn test_get_all_uses_cache() {
        let pool = ScriptedPool::new(1);
        pool.push_rows(vec![json!({"uid": 1, "category_name": "Best Hack", "is_sponsor": false})]);
        let mapper = CategoryMapper::new(&Rbac::new(), scripted_uow(&pool));

        let first = mapper.get_all(&MapperOpts::new()).await.unwrap();
        let second = mapper.get_all(&MapperOpts::new()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].uid, Some(1));
        assert_eq!(pool.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_passes_through() {
        let pool = ScriptedPool::new(1);
        pool.push_error(fixtures::duplicate_error());
        let mapper = CategoryMapper::new(&Rbac::new(), scripted_uow(&pool));

        let err = mapper.insert(fixtures::category("Best Hack")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Duplicate);
    }

    #[tokio::test]
    async fn test_update_requires_uid() {
        let pool = ScriptedPool::new(1);
        let mapper = CategoryMapper::new(&Rbac::new(), scripted_uow(&pool));
        let err = mapper.update(fixtures::category("Best Hack")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(pool.statements().is_empty());
    }
}
