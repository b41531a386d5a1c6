//! Hierarchical-store Unit of Work.
//!
//! Unlike the SQL Unit of Work, an empty GET is an empty list, not an error.

use std::sync::Arc;

use hackhub_core::{DataError, DataResult};
use serde_json::Value as JsonValue;

use super::path::TreePath;
use super::store::{TreeChild, TreeStore};

/// Operation performed by [`TreeUow::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum TreeQuery {
    /// Values of the immediate children.
    Get,
    /// Overwrite the value at the path.
    Set(JsonValue),
    /// Same write semantics as `Set`; kept distinct for callers' intent.
    Update(JsonValue),
    /// Remove the subtree.
    Delete,
    /// Number of immediate children.
    Count,
    /// String reference to the path.
    Ref,
}

impl TreeQuery {
    fn name(&self) -> &'static str {
        match self {
            TreeQuery::Get => "GET",
            TreeQuery::Set(_) => "SET",
            TreeQuery::Update(_) => "UPDATE",
            TreeQuery::Delete => "DELETE",
            TreeQuery::Count => "COUNT",
            TreeQuery::Ref => "REF",
        }
    }
}

/// Result of [`TreeUow::execute`], one variant per query kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeOutput {
    Values(Vec<TreeChild>),
    Written(TreeChild),
    Deleted,
    Count(usize),
    Ref(String),
}

/// Unit of Work over a [`TreeStore`].
#[derive(Clone)]
pub struct TreeUow {
    store: Arc<dyn TreeStore>,
}

impl TreeUow {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    /// Run one operation against `path`.
    pub async fn execute(&self, query: TreeQuery, path: &TreePath) -> DataResult<TreeOutput> {
        tracing::debug!(query = query.name(), path = %path, "tree query");
        match query {
            TreeQuery::Get => Ok(TreeOutput::Values(self.store.children(path).await?)),
            TreeQuery::Count => Ok(TreeOutput::Count(self.store.children(path).await?.len())),
            TreeQuery::Set(value) | TreeQuery::Update(value) => {
                if value.is_null() {
                    return Err(DataError::validation("A value must be provided to write"));
                }
                let key = path
                    .key()
                    .ok_or_else(|| DataError::validation("Cannot overwrite the root"))?
                    .to_string();
                let apply = move |_: Option<&JsonValue>| value.clone();
                let committed = self.store.transaction(path, &apply).await?;
                Ok(TreeOutput::Written(TreeChild {
                    key,
                    value: committed,
                }))
            }
            TreeQuery::Delete => {
                self.store.remove(path).await?;
                Ok(TreeOutput::Deleted)
            }
            TreeQuery::Ref => Ok(TreeOutput::Ref(self.store.ref_url(path))),
        }
    }

    pub async fn get(&self, path: &TreePath) -> DataResult<Vec<TreeChild>> {
        match self.execute(TreeQuery::Get, path).await? {
            TreeOutput::Values(values) => Ok(values),
            other => Err(unexpected("GET", &other)),
        }
    }

    pub async fn set(&self, path: &TreePath, value: JsonValue) -> DataResult<TreeChild> {
        match self.execute(TreeQuery::Set(value), path).await? {
            TreeOutput::Written(child) => Ok(child),
            other => Err(unexpected("SET", &other)),
        }
    }

    pub async fn update(&self, path: &TreePath, value: JsonValue) -> DataResult<TreeChild> {
        match self.execute(TreeQuery::Update(value), path).await? {
            TreeOutput::Written(child) => Ok(child),
            other => Err(unexpected("UPDATE", &other)),
        }
    }

    pub async fn delete(&self, path: &TreePath) -> DataResult<()> {
        self.execute(TreeQuery::Delete, path).await.map(|_| ())
    }

    pub async fn count(&self, path: &TreePath) -> DataResult<usize> {
        match self.execute(TreeQuery::Count, path).await? {
            TreeOutput::Count(n) => Ok(n),
            other => Err(unexpected("COUNT", &other)),
        }
    }

    pub fn reference(&self, path: &TreePath) -> String {
        self.store.ref_url(path)
    }

    /// Read the value stored exactly at `path`.
    pub async fn read(&self, path: &TreePath) -> DataResult<Option<JsonValue>> {
        self.store.read_once(path).await
    }
}

fn unexpected(query: &str, output: &TreeOutput) -> DataError {
    DataError::unknown("Unexpected tree store output").with_detail(format!("{} returned {:?}", query, output))
}
