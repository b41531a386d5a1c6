//! Live update mapper
//!
//! Live updates are kept in the hierarchical store under
//! `/updates/<hackathon>/<update>` so clients can subscribe to the
//! hackathon's node directly. The hackathon segment comes from the options or
//! the active hackathon; `by_hackathon` is implied.

use std::sync::Arc;

use ::async_trait::async_trait;
use hackhub_core::{new_update_id, AuthLevel, DataError, DataResult, HackathonId, LiveUpdate, UpdateId};
use hackhub_storage::{TreeChild, TreePath, TreeUow};

use super::{ActiveHackathonMapper, DataMapper, MapperOpts};
use crate::rbac::{add_rbac, AclOperation, AclPermissions, CrudPermissions, Rbac};
use crate::validation::LIVE_UPDATE_SCHEMA;

pub const UPDATES_FEATURE: &str = "updates";

pub struct LiveUpdateMapper {
    tree: TreeUow,
    hackathons: Arc<ActiveHackathonMapper>,
    permissions: CrudPermissions,
}

impl LiveUpdateMapper {
    pub fn new(rbac: &Rbac, tree: TreeUow, hackathons: Arc<ActiveHackathonMapper>) -> Self {
        let permissions = CrudPermissions::for_prefix("event");
        add_rbac(
            rbac,
            &[
                permissions.create.as_str(),
                permissions.update.as_str(),
                permissions.delete.as_str(),
            ],
            &[AuthLevel::TeamMember],
            None,
            &[AuthLevel::Volunteer],
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
            tree,
            hackathons,
            permissions,
        }
    }

    /// Store reference for the hackathon's update node, for client
    /// subscriptions. No I/O beyond resolving the active hackathon.
    pub async fn reference(&self, opts: &MapperOpts) -> DataResult<String> {
        let path = self.path(opts, None).await?;
        Ok(self.tree.reference(&path))
    }

    async fn hackathon(&self, opts: &MapperOpts) -> DataResult<HackathonId> {
        match &opts.hackathon {
            Some(hackathon) => Ok(hackathon.clone()),
            None => self.hackathons.active_hackathon_id().await,
        }
    }

    async fn path(&self, opts: &MapperOpts, id: Option<&str>) -> DataResult<TreePath> {
        let hackathon = self.hackathon(opts).await?;
        TreePath::entity(UPDATES_FEATURE, &hackathon, id)
    }

    async fn write(&self, id: UpdateId, update: &LiveUpdate, replace: bool) -> DataResult<LiveUpdate> {
        let path = self.path(&MapperOpts::default(), Some(&id)).await?;
        let mut value = serde_json::to_value(update)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("uid");
        }
        let child = if replace {
            self.tree.set(&path, value).await?
        } else {
            self.tree.update(&path, value).await?
        };
        from_child(child)
    }
}

fn from_child(child: TreeChild) -> DataResult<LiveUpdate> {
    let mut update: LiveUpdate = serde_json::from_value(child.value)?;
    update.uid = Some(child.key);
    Ok(update)
}

impl AclPermissions for LiveUpdateMapper {
    fn permission(&self, operation: AclOperation) -> Option<&str> {
        self.permissions.permission(operation)
    }
}

#[async_trait]
impl DataMapper for LiveUpdateMapper {
    type Entity = LiveUpdate;
    type Id = UpdateId;

    async fn get(&self, id: &UpdateId, opts: &MapperOpts) -> DataResult<LiveUpdate> {
        let path = self.path(opts, Some(id)).await?;
        let value = self
            .tree
            .read(&path)
            .await?
            .ok_or_else(|| DataError::not_found("Live update not found"))?;
        from_child(TreeChild {
            key: id.clone(),
            value,
        })
    }

    /// An empty node is an empty list.
    async fn get_all(&self, opts: &MapperOpts) -> DataResult<Vec<LiveUpdate>> {
        let path = self.path(opts, None).await?;
        let children = self.tree.get(&path).await?;
        let skip = opts.offset.unwrap_or(0).max(0) as usize;
        let take = opts.count.map_or(usize::MAX, |c| c.max(0) as usize);
        children
            .into_iter()
            .skip(skip)
            .take(take)
            .map(from_child)
            .collect()
    }

    async fn get_count(&self, opts: &MapperOpts) -> DataResult<i64> {
        let path = self.path(opts, None).await?;
        Ok(self.tree.count(&path).await? as i64)
    }

    async fn insert(&self, update: LiveUpdate) -> DataResult<LiveUpdate> {
        LIVE_UPDATE_SCHEMA.validate(&update)?;
        let stored = self.write(new_update_id(), &update, true).await?;
        if update.push_notification {
            tracing::info!(update = ?stored.uid, "live update flagged for push delivery");
        }
        Ok(stored)
    }

    async fn update(&self, update: LiveUpdate) -> DataResult<LiveUpdate> {
        LIVE_UPDATE_SCHEMA.validate(&update)?;
        let id = update
            .uid
            .clone()
            .ok_or_else(|| DataError::validation("uid is required to update a live update"))?;
        self.write(id, &update, false).await
    }

    async fn delete(&self, id: &UpdateId) -> DataResult<()> {
        let path = self.path(&MapperOpts::default(), Some(id)).await?;
        self.tree.delete(&path).await
    }
}
