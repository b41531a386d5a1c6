//! Project mapper and judging-table allocator
//!
//! Projects live in `projects`; the categories a project competes in live in
//! `project_categories` and are folded back into the row as an array on
//! read. Writes that touch both tables run on one Unit of Work handle.
//!
//! # Table allocation
//!
//! Each physical judging table supports a set of categories
//! (`table_supports`). [`ProjectMapper::assign_table`] hands a project the
//! highest-priority free table that supports *every* category of the
//! project, in a single `INSERT .. SELECT` whose read takes a row lock on the
//! chosen table. A concurrent allocator skips the locked row, so two
//! requests racing for the last eligible table never both win.
//!
//! The statement reads `table_assignments` as of its own start. An
//! allocation committed after that point is invisible to it, so it can still
//! pick that table and trip the unique `(hackathon, table_number)`
//! constraint. The statement is then run again; the fresh run sees the
//! committed row and moves on to the next eligible table.

use std::collections::BTreeSet;
use std::sync::Arc;

use ::async_trait::async_trait;
use hackhub_core::{
    AuthLevel, DataError, DataResult, ErrorKind, HackathonId, Project, ProjectId, TableAssignment,
};
use hackhub_storage::{
    Delete, Insert, LockMode, QueryOpts, Select, SqlParam, SqlUow, Statement, UowHandle, Update,
};

use super::{
    all_rows, apply_read_opts, count_from_rows, first_row, scope_to_hackathon, ActiveHackathonMapper,
    DataMapper, MapperOpts,
};
use crate::rbac::{add_rbac, AclOperation, AclPermissions, CrudPermissions, Rbac};
use crate::validation::PROJECT_SCHEMA;

pub const PROJECT_TABLE: &str = "projects";
pub const PROJECT_CATEGORY_TABLE: &str = "project_categories";

const CATEGORIES_EXPR: &str = "ARRAY(SELECT \"pc\".\"category_id\" FROM \"project_categories\" \"pc\" \
     WHERE \"pc\".\"project_id\" = \"p\".\"uid\" ORDER BY \"pc\".\"category_id\") AS \"categories\"";

const TABLES: &str = "tables";
const TABLE_ASSIGNMENT_TABLE: &str = "table_assignments";

/// Tables supporting every requested category. Grouping happens in a
/// subquery because a locking read cannot aggregate.
const SUPPORTS_ALL_CATEGORIES: &str = "\"t\".\"table_number\" IN (\
SELECT \"s\".\"table_number\" FROM \"table_supports\" \"s\" \
WHERE \"s\".\"category_id\" = ANY(?::int4[]) \
GROUP BY \"s\".\"table_number\" \
HAVING COUNT(DISTINCT \"s\".\"category_id\") = ?::bigint)";

const NOT_YET_ASSIGNED: &str = "\"t\".\"table_number\" NOT IN (\
SELECT \"a\".\"table_number\" FROM \"table_assignments\" \"a\" WHERE \"a\".\"hackathon\" = ?::text)";

/// Runs of the allocation statement before a table taken under it is
/// reported as no table at all.
pub const ALLOCATION_ATTEMPTS: usize = 3;

/// Allocate one table to a project.
///
/// Binds `$1` project, `$2` hackathon, `$3` category ids, `$4` number of
/// distinct categories, `$5` hackathon again and `$6` the limit of one.
pub fn assign_table_statement(
    project_id: ProjectId,
    hackathon: &str,
    categories: &BTreeSet<i32>,
) -> Statement {
    let eligible = Select::from(TABLES)
        .alias("t")
        .columns(&["t.table_number"])
        .expr_with("?::bigint", vec![SqlParam::Long(project_id)])
        .expr_with("?::text", vec![SqlParam::from(hackathon)])
        .filter(
            SUPPORTS_ALL_CATEGORIES,
            vec![
                SqlParam::IntArray(categories.iter().copied().collect()),
                SqlParam::Long(categories.len() as i64),
            ],
        )
        .filter(NOT_YET_ASSIGNED, vec![SqlParam::from(hackathon)])
        .order_by("\"t\".\"priority\"")
        .order_by("\"t\".\"table_number\"")
        .limit(1)
        .lock(LockMode::ForUpdate, Some("t"), true);

    Insert::into(TABLE_ASSIGNMENT_TABLE)
        .from_select(&["table_number", "project_id", "hackathon"], eligible)
        .returning(&["table_number", "project_id"])
        .build()
}

fn no_table_available() -> DataError {
    DataError::not_found("No free judging table supports every category of this project")
}

pub struct ProjectMapper {
    uow: SqlUow,
    hackathons: Arc<ActiveHackathonMapper>,
    permissions: CrudPermissions,
    assign_table: String,
}

impl ProjectMapper {
    pub fn new(rbac: &Rbac, uow: SqlUow, hackathons: Arc<ActiveHackathonMapper>) -> Self {
        let permissions = CrudPermissions::for_prefix("project");
        let assign_table = "project:assign-table".to_string();

        add_rbac(
            rbac,
            &[permissions.delete.as_str()],
            &[AuthLevel::Technology],
            None,
            &[AuthLevel::Director],
        );
        add_rbac(
            rbac,
            &[permissions.count.as_str()],
            &[AuthLevel::TeamMember],
            None,
            &[AuthLevel::Volunteer],
        );
        add_rbac(
            rbac,
            &[permissions.read_all.as_str()],
            &[AuthLevel::Volunteer],
            None,
            &[AuthLevel::Participant],
        );
        add_rbac(
            rbac,
            &[
                permissions.create.as_str(),
                permissions.read.as_str(),
                permissions.update.as_str(),
                assign_table.as_str(),
            ],
            &[AuthLevel::Participant],
            None,
            &[],
        );

        Self {
            uow,
            hackathons,
            permissions,
            assign_table,
        }
    }

    /// Give `project` a judging table supporting all of its categories.
    ///
    /// No eligible table, including losing a race for the last one, is
    /// NOT_FOUND. A table taken under a running statement is retried up to
    /// [`ALLOCATION_ATTEMPTS`] times. A project without categories is
    /// rejected before any statement is issued.
    pub async fn assign_table(&self, project: &Project) -> DataResult<TableAssignment> {
        let project_id = project
            .uid
            .ok_or_else(|| DataError::validation("uid is required to assign a table"))?;
        let categories: BTreeSet<i32> = project.categories.iter().copied().collect();
        if categories.is_empty() {
            return Err(DataError::validation(
                "A project needs at least one category to be assigned a table",
            ));
        }
        let hackathon = match &project.hackathon {
            Some(hackathon) => hackathon.clone(),
            None => self.hackathons.active_hackathon_id().await?,
        };

        let stmt = assign_table_statement(project_id, &hackathon, &categories);
        for attempt in 1..=ALLOCATION_ATTEMPTS {
            match self.uow.execute(&stmt, QueryOpts::default()).await {
                Ok(rows) => {
                    let assignment: TableAssignment = first_row(rows)?;
                    tracing::info!(
                        project = assignment.project_id,
                        table = assignment.table_number,
                        attempt,
                        "judging table assigned"
                    );
                    return Ok(assignment);
                }
                Err(e) if e.kind == ErrorKind::NotFound => {
                    tracing::info!(project = project_id, "no judging table available");
                    return Err(no_table_available());
                }
                // Another allocator committed the chosen table after this
                // statement took its snapshot.
                Err(e) if e.kind == ErrorKind::Duplicate => {
                    tracing::debug!(project = project_id, attempt, "judging table taken concurrently");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::warn!(
            project = project_id,
            attempts = ALLOCATION_ATTEMPTS,
            "judging table allocation kept losing races"
        );
        Err(no_table_available())
    }

    fn select(opts: &MapperOpts) -> Select {
        let select = Select::from(PROJECT_TABLE).alias("p");
        if opts.fields.is_some() {
            select
        } else {
            select.columns(&["p.*"]).expr(CATEGORIES_EXPR)
        }
    }

    async fn write_categories(
        handle: &mut UowHandle,
        project_id: ProjectId,
        categories: &[i32],
    ) -> DataResult<()> {
        if categories.is_empty() {
            return Ok(());
        }
        let stmt = Statement::new(
            "INSERT INTO \"project_categories\" (\"project_id\", \"category_id\") \
             SELECT $1::bigint, UNNEST($2::int4[]) RETURNING \"category_id\"",
            vec![SqlParam::Long(project_id), SqlParam::IntArray(categories.to_vec())],
        );
        handle.query(&stmt).await?;
        Ok(())
    }

    async fn insert_in(
        handle: &mut UowHandle,
        hackathon: HackathonId,
        project: Project,
    ) -> DataResult<Project> {
        let stmt = Insert::into(PROJECT_TABLE)
            .value("project_name", project.project_name.as_str())
            .value("hackathon", hackathon)
            .value("team", project.team.clone())
            .returning(&["*"])
            .build();
        let mut stored: Project = first_row(handle.query(&stmt).await?)?;
        let uid = stored
            .uid
            .ok_or_else(|| DataError::unknown("Inserted project has no uid"))?;
        Self::write_categories(handle, uid, &project.categories).await?;
        stored.categories = project.categories;
        Ok(stored)
    }

    async fn update_in(
        handle: &mut UowHandle,
        uid: ProjectId,
        project: Project,
    ) -> DataResult<Project> {
        let stmt = Update::table(PROJECT_TABLE)
            .set("project_name", project.project_name.as_str())
            .set("team", project.team.clone())
            .filter("\"uid\" = ?", vec![SqlParam::Long(uid)])
            .returning(&["*"])
            .build();
        let mut stored: Project = first_row(handle.query(&stmt).await?)?;

        let clear = Delete::from(PROJECT_CATEGORY_TABLE)
            .filter("\"project_id\" = ?", vec![SqlParam::Long(uid)])
            .returning(&["category_id"])
            .build();
        match handle.query(&clear).await {
            Ok(_) => {}
            Err(e) if e.kind == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Self::write_categories(handle, uid, &project.categories).await?;
        stored.categories = project.categories;
        Ok(stored)
    }
}

/// Commit `handle` on success, roll it back otherwise.
async fn finish<T>(handle: UowHandle, result: DataResult<T>) -> DataResult<T> {
    match result {
        Ok(value) => {
            handle.complete().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = handle.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

impl AclPermissions for ProjectMapper {
    fn permission(&self, operation: AclOperation) -> Option<&str> {
        match operation {
            AclOperation::AssignTable => Some(&self.assign_table),
            other => self.permissions.permission(other),
        }
    }
}

#[async_trait]
impl DataMapper for ProjectMapper {
    type Entity = Project;
    type Id = ProjectId;

    async fn get(&self, id: &ProjectId, opts: &MapperOpts) -> DataResult<Project> {
        let mut select = Self::select(opts);
        if let Some(fields) = &opts.fields {
            select = select.columns(fields);
        }
        let stmt = select
            .filter("\"p\".\"uid\" = ?", vec![SqlParam::Long(*id)])
            .build();
        first_row(self.uow.execute(&stmt, opts.query_opts()).await?)
    }

    async fn get_all(&self, opts: &MapperOpts) -> DataResult<Vec<Project>> {
        let select = scope_to_hackathon(Self::select(opts), "\"p\".\"hackathon\"", opts)
            .order_by("\"p\".\"uid\"");
        let stmt = apply_read_opts(select, opts).build();
        all_rows(self.uow.execute(&stmt, opts.query_opts()).await?)
    }

    async fn get_count(&self, opts: &MapperOpts) -> DataResult<i64> {
        let select = Select::from(PROJECT_TABLE)
            .alias("p")
            .expr("COUNT(\"p\".\"uid\") AS count");
        let stmt = scope_to_hackathon(select, "\"p\".\"hackathon\"", opts).build();
        count_from_rows(&self.uow.execute(&stmt, opts.query_opts()).await?)
    }

    /// Fills in the active hackathon when the project names none.
    async fn insert(&self, project: Project) -> DataResult<Project> {
        PROJECT_SCHEMA.validate(&project)?;
        // Resolved before the handle takes its connection.
        let hackathon = match &project.hackathon {
            Some(hackathon) => hackathon.clone(),
            None => self.hackathons.active_hackathon_id().await?,
        };
        let mut handle = self.uow.begin().await?;
        let result = Self::insert_in(&mut handle, hackathon, project).await;
        finish(handle, result).await
    }

    async fn update(&self, project: Project) -> DataResult<Project> {
        PROJECT_SCHEMA.validate(&project)?;
        let uid = project
            .uid
            .ok_or_else(|| DataError::validation("uid is required to update a project"))?;
        let mut handle = self.uow.begin().await?;
        let result = Self::update_in(&mut handle, uid, project).await;
        finish(handle, result).await
    }

    async fn delete(&self, id: &ProjectId) -> DataResult<()> {
        let stmt = Delete::from(PROJECT_TABLE)
            .filter("\"uid\" = ?", vec![SqlParam::Long(*id)])
            .returning(&["uid"])
            .build();
        self.uow.execute(&stmt, QueryOpts::default()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hackhub_test_utils::{fixtures, scripted_uow, PoolEvent, ScriptedPool};
    use serde_json::json;

    fn mapper(pool: &ScriptedPool) -> ProjectMapper {
        let rbac = Rbac::new();
        let hackathons = Arc::new(ActiveHackathonMapper::new(&rbac, scripted_uow(pool)));
        ProjectMapper::new(&rbac, scripted_uow(pool), hackathons)
    }

    #[test]
    fn test_allocator_locks_the_table_row() {
        let categories: BTreeSet<i32> = [3, 1].into_iter().collect();
        let stmt = assign_table_statement(9, "live", &categories);
        let text = &stmt.text;

        assert!(text.starts_with(
            "INSERT INTO \"table_assignments\" (\"table_number\", \"project_id\", \"hackathon\") \
             SELECT \"t\".\"table_number\", $1::bigint, $2::text FROM \"tables\" \"t\""
        ));
        assert!(text.contains("ANY($3::int4[])"));
        assert!(text.contains("HAVING COUNT(DISTINCT \"s\".\"category_id\") = $4::bigint"));
        assert!(text.contains("\"a\".\"hackathon\" = $5::text"));
        assert!(text.contains(
            "ORDER BY \"t\".\"priority\", \"t\".\"table_number\" LIMIT $6 FOR UPDATE OF \"t\" SKIP LOCKED"
        ));
        assert!(text.ends_with("RETURNING \"table_number\", \"project_id\""));
        assert_eq!(
            stmt.params,
            vec![
                SqlParam::Long(9),
                SqlParam::from("live"),
                SqlParam::IntArray(vec![1, 3]),
                SqlParam::Long(2),
                SqlParam::from("live"),
                SqlParam::Long(1),
            ]
        );
    }

    #[test]
    fn test_rbac_registrations() {
        let rbac = Rbac::new();
        let hackathons = Arc::new(ActiveHackathonMapper::new(
            &rbac,
            scripted_uow(&ScriptedPool::new(1)),
        ));
        let _projects = ProjectMapper::new(&rbac, scripted_uow(&ScriptedPool::new(1)), hackathons);

        assert!(rbac.can("PARTICIPANT", "project:create", None));
        assert!(rbac.can("PARTICIPANT", "project:assign-table", None));
        assert!(!rbac.can("PARTICIPANT", "project:readall", None));
        assert!(rbac.can("VOLUNTEER", "project:readall", None));
        assert!(rbac.can("TEAM_MEMBER", "project:count", None));
        assert!(!rbac.can("DIRECTOR", "project:delete", None));
        assert!(rbac.can("TECHNOLOGY", "project:delete", None));
    }

    #[tokio::test]
    async fn test_assign_table_without_categories_is_rejected() {
        let pool = ScriptedPool::new(1);
        let err = mapper(&pool)
            .assign_table(&fixtures::project(1, &[]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(pool.statements().is_empty());
    }

    #[tokio::test]
    async fn test_assign_table_binds_distinct_categories() {
        let pool = ScriptedPool::new(1);
        pool.push_rows(vec![json!({"table_number": 4, "project_id": 9})]);
        let assignment = mapper(&pool)
            .assign_table(&fixtures::project(9, &[2, 1, 2]))
            .await
            .unwrap();
        assert_eq!(assignment, TableAssignment { table_number: 4, project_id: 9 });

        let statements = pool.statements();
        assert_eq!(statements[0].params[2], SqlParam::IntArray(vec![1, 2]));
        assert_eq!(statements[0].params[3], SqlParam::Long(2));
    }

    #[tokio::test]
    async fn test_table_taken_under_the_statement_is_retried() {
        let pool = ScriptedPool::new(1);
        pool.push_error(fixtures::duplicate_error());
        pool.push_rows(vec![json!({"table_number": 2, "project_id": 9})]);

        let assignment = mapper(&pool)
            .assign_table(&fixtures::project(9, &[1, 2]))
            .await
            .unwrap();
        assert_eq!(assignment.table_number, 2);

        let statements = pool.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], statements[1]);
        assert_eq!(pool.count_events(&PoolEvent::Rollback), 1);
        assert_eq!(pool.count_events(&PoolEvent::Commit), 1);
    }

    #[tokio::test]
    async fn test_allocation_gives_up_after_repeated_races() {
        let pool = ScriptedPool::new(1);
        for _ in 0..ALLOCATION_ATTEMPTS + 1 {
            pool.push_error(fixtures::duplicate_error());
        }

        let err = mapper(&pool)
            .assign_table(&fixtures::project(9, &[1]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(pool.statements().len(), ALLOCATION_ATTEMPTS);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_insert_writes_both_tables_in_one_transaction() {
        let pool = ScriptedPool::new(2);
        pool.push_rows(vec![fixtures::project_row(5)]);
        pool.push_rows(vec![json!({"category_id": 1}), json!({"category_id": 3})]);

        let stored = mapper(&pool)
            .insert(fixtures::project(5, &[1, 3]))
            .await
            .unwrap();
        assert_eq!(stored.uid, Some(5));
        assert_eq!(stored.categories, vec![1, 3]);
        assert_eq!(pool.count_events(&PoolEvent::Begin), 1);
        assert_eq!(pool.count_events(&PoolEvent::Commit), 1);
        assert_eq!(pool.count_events(&PoolEvent::Rollback), 0);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_insert_rolls_back_when_categories_fail() {
        let pool = ScriptedPool::new(1);
        pool.push_rows(vec![fixtures::project_row(5)]);
        pool.push_error(DataError::from_kind(ErrorKind::DependencyMissing));

        let err = mapper(&pool)
            .insert(fixtures::project(5, &[99]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DependencyMissing);
        assert_eq!(pool.count_events(&PoolEvent::Commit), 0);
        assert_eq!(pool.count_events(&PoolEvent::Rollback), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_get_all_scoped_to_active_hackathon() {
        let pool = ScriptedPool::new(1);
        pool.push_rows(vec![fixtures::project_row(1)]);
        let projects = mapper(&pool)
            .get_all(&MapperOpts::new().active_hackathon().paginate(0, 10))
            .await
            .unwrap();
        assert_eq!(projects.len(), 1);

        let text = &pool.statements()[0].text;
        assert!(text.contains("\"p\".\"hackathon\" = (SELECT \"uid\" FROM \"hackathons\" WHERE \"active\" = TRUE)"));
        assert!(text.ends_with("LIMIT $1 OFFSET $2"));
    }
}
