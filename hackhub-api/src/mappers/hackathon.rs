//! Active hackathon mapper
//!
//! The `hackathons` table is the tenant table: exactly one row carries
//! `active = TRUE` and almost every other query is scoped to it. The active
//! row is memoised after the first lookup and the memo is dropped whenever
//! this mapper changes which row is active.

use ::async_trait::async_trait;
use hackhub_core::{now_epoch_ms, AuthLevel, DataError, DataResult, Hackathon, HackathonId};
use hackhub_storage::{Delete, Insert, QueryOpts, Select, SqlParam, SqlUow, Update};
use tokio::sync::RwLock;

use super::{
    all_rows, apply_read_opts, count_from_rows, first_row, DataMapper, MapperOpts, HACKATHON_TABLE,
};
use crate::rbac::{add_rbac, AclOperation, AclPermissions, CrudPermissions, Rbac};
use crate::validation::HACKATHON_SCHEMA;

const PK: &str = "uid";

pub struct ActiveHackathonMapper {
    uow: SqlUow,
    permissions: CrudPermissions,
    make_active: String,
    active: RwLock<Option<Hackathon>>,
}

impl ActiveHackathonMapper {
    /// Build the mapper and register its capabilities with `rbac`.
    pub fn new(rbac: &Rbac, uow: SqlUow) -> Self {
        let permissions = CrudPermissions::for_prefix("active-hackathon");
        let make_active = "active-hackathon:make-active".to_string();

        add_rbac(
            rbac,
            &[
                permissions.create.as_str(),
                permissions.update.as_str(),
                make_active.as_str(),
            ],
            &[AuthLevel::Director],
            None,
            &[AuthLevel::TeamMember],
        );
        add_rbac(
            rbac,
            &[permissions.delete.as_str()],
            &[AuthLevel::Technology],
            None,
            &[AuthLevel::Director],
        );
        add_rbac(
            rbac,
            &[
                permissions.read.as_str(),
                permissions.read_all.as_str(),
                permissions.count.as_str(),
            ],
            &[AuthLevel::Participant],
            None,
            &[],
        );

        Self {
            uow,
            permissions,
            make_active,
            active: RwLock::new(None),
        }
    }

    /// The active hackathon, read once and then served from the memo.
    pub async fn active_hackathon(&self) -> DataResult<Hackathon> {
        if let Some(hackathon) = self.active.read().await.as_ref() {
            return Ok(hackathon.clone());
        }

        let mut memo = self.active.write().await;
        if let Some(hackathon) = memo.as_ref() {
            return Ok(hackathon.clone());
        }
        let stmt = Select::from(HACKATHON_TABLE)
            .filter("\"active\" = ?", vec![SqlParam::Bool(true)])
            .build();
        let hackathon: Hackathon = first_row(self.uow.execute(&stmt, QueryOpts::default()).await?)?;
        tracing::debug!(hackathon = %hackathon.uid, "resolved active hackathon");
        *memo = Some(hackathon.clone());
        Ok(hackathon)
    }

    /// Id of the active hackathon.
    pub async fn active_hackathon_id(&self) -> DataResult<HackathonId> {
        Ok(self.active_hackathon().await?.uid)
    }

    /// Make `id` the active hackathon.
    ///
    /// One statement closes the current hackathon (stamping `end_time`) and
    /// activates `id`. An unknown `id` changes nothing and is NOT_FOUND.
    pub async fn make_active(&self, id: &str) -> DataResult<Hackathon> {
        let stmt = Update::table(HACKATHON_TABLE)
            .set_expr("\"active\" = (\"uid\" = ?)", vec![id.into()])
            .set_expr(
                "\"end_time\" = CASE WHEN \"uid\" = ? THEN \"end_time\" ELSE ? END",
                vec![id.into(), SqlParam::Long(now_epoch_ms())],
            )
            .filter("\"uid\" = ? OR \"active\" = TRUE", vec![id.into()])
            .filter(
                &format!("EXISTS (SELECT 1 FROM \"{}\" WHERE \"uid\" = ?)", HACKATHON_TABLE),
                vec![id.into()],
            )
            .returning(&["*"])
            .build();

        let rows = self.uow.execute(&stmt, QueryOpts::default()).await;
        self.reset().await;
        let updated: Vec<Hackathon> = all_rows(rows?)?;
        let activated = updated
            .into_iter()
            .find(|h| h.uid == id)
            .ok_or_else(|| DataError::not_found("Hackathon not found"))?;
        tracing::info!(hackathon = %activated.uid, "hackathon made active");
        *self.active.write().await = Some(activated.clone());
        Ok(activated)
    }

    /// Forget the memoised active hackathon.
    pub async fn reset(&self) {
        self.active.write().await.take();
    }
}

impl AclPermissions for ActiveHackathonMapper {
    fn permission(&self, operation: AclOperation) -> Option<&str> {
        match operation {
            AclOperation::MakeActive => Some(&self.make_active),
            other => self.permissions.permission(other),
        }
    }
}

#[async_trait]
impl DataMapper for ActiveHackathonMapper {
    type Entity = Hackathon;
    type Id = HackathonId;

    async fn get(&self, id: &HackathonId, opts: &MapperOpts) -> DataResult<Hackathon> {
        let mut select = Select::from(HACKATHON_TABLE);
        if let Some(fields) = &opts.fields {
            select = select.columns(fields);
        }
        let stmt = select
            .filter(&format!("\"{}\" = ?", PK), vec![id.as_str().into()])
            .build();
        first_row(self.uow.execute(&stmt, opts.query_opts()).await?)
    }

    async fn get_all(&self, opts: &MapperOpts) -> DataResult<Vec<Hackathon>> {
        let select = Select::from(HACKATHON_TABLE).order_by("\"start_time\"");
        let stmt = apply_read_opts(select, opts).build();
        all_rows(self.uow.execute(&stmt, opts.query_opts()).await?)
    }

    async fn get_count(&self, opts: &MapperOpts) -> DataResult<i64> {
        let stmt = Select::from(HACKATHON_TABLE)
            .expr(&format!("COUNT(\"{}\") AS count", PK))
            .build();
        count_from_rows(&self.uow.execute(&stmt, opts.query_opts()).await?)
    }

    async fn insert(&self, hackathon: Hackathon) -> DataResult<Hackathon> {
        HACKATHON_SCHEMA.validate(&hackathon)?;
        let stmt = Insert::into(HACKATHON_TABLE)
            .value("uid", hackathon.uid.as_str())
            .value("name", hackathon.name.as_str())
            .value("start_time", hackathon.start_time)
            .value("end_time", hackathon.end_time)
            .value("base_pin", hackathon.base_pin)
            .value("active", false)
            .returning(&["*"])
            .build();
        first_row(self.uow.execute(&stmt, QueryOpts::default()).await?)
    }

    /// Updates descriptive fields only; activation goes through
    /// [`ActiveHackathonMapper::make_active`].
    async fn update(&self, hackathon: Hackathon) -> DataResult<Hackathon> {
        HACKATHON_SCHEMA.validate(&hackathon)?;
        let stmt = Update::table(HACKATHON_TABLE)
            .set("name", hackathon.name.as_str())
            .set("start_time", hackathon.start_time)
            .set("end_time", hackathon.end_time)
            .set("base_pin", hackathon.base_pin)
            .filter(&format!("\"{}\" = ?", PK), vec![hackathon.uid.as_str().into()])
            .returning(&["*"])
            .build();
        let updated: Hackathon = first_row(self.uow.execute(&stmt, QueryOpts::default()).await?)?;
        if updated.active {
            self.reset().await;
        }
        Ok(updated)
    }

    async fn delete(&self, id: &HackathonId) -> DataResult<()> {
        let stmt = Delete::from(HACKATHON_TABLE)
            .filter(&format!("\"{}\" = ?", PK), vec![id.as_str().into()])
            .returning(&[PK])
            .build();
        self.uow.execute(&stmt, QueryOpts::default()).await?;
        self.reset().await;
        Ok(())
    }
}
