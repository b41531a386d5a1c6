//! Hierarchical store seam and the in-memory implementation.

use ::async_trait::async_trait;
use hackhub_core::DataResult;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::path::TreePath;

/// One immediate child of a path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeChild {
    pub key: String,
    pub value: JsonValue,
}

impl TreeChild {
    /// `{ key: value }`, the shape callers receive for a child.
    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::with_capacity(1);
        object.insert(self.key.clone(), self.value.clone());
        JsonValue::Object(object)
    }
}

/// Function applied by [`TreeStore::transaction`] to the current value.
pub type TreeUpdateFn<'a> = &'a (dyn Fn(Option<&JsonValue>) -> JsonValue + Send + Sync);

/// Client for a path-addressed JSON tree.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Value at `path`, or `None` if nothing is stored there.
    async fn read_once(&self, path: &TreePath) -> DataResult<Option<JsonValue>>;

    /// Read-modify-write `path`, retrying on concurrent modification until
    /// `update`'s result is committed. Returns the committed value.
    async fn transaction(&self, path: &TreePath, update: TreeUpdateFn<'_>) -> DataResult<JsonValue>;

    /// Immediate children of `path`. A leaf or missing path has none.
    async fn children(&self, path: &TreePath) -> DataResult<Vec<TreeChild>> {
        Ok(self
            .read_once(path)
            .await?
            .map(children_of)
            .unwrap_or_default())
    }

    /// Remove the subtree at `path`.
    async fn remove(&self, path: &TreePath) -> DataResult<()>;

    /// Absolute reference for `path`. No I/O.
    fn ref_url(&self, path: &TreePath) -> String;
}

/// Split a stored value into its immediate children.
///
/// Arrays are keyed by index, the way the realtime database exposes them.
pub fn children_of(value: JsonValue) -> Vec<TreeChild> {
    match value {
        JsonValue::Object(map) => map
            .into_iter()
            .map(|(key, value)| TreeChild { key, value })
            .collect(),
        JsonValue::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(idx, value)| TreeChild {
                key: idx.to_string(),
                value,
            })
            .collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// A JSON tree held in process. Writes are serialised by a lock, so the
/// transaction never needs to retry.
#[derive(Debug, Default)]
pub struct InMemoryTreeStore {
    root: RwLock<JsonValue>,
}

impl InMemoryTreeStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(JsonValue::Null),
        }
    }

    /// Snapshot of the whole tree.
    pub fn snapshot(&self) -> JsonValue {
        self.root.read().clone()
    }
}

fn lookup<'a>(root: &'a JsonValue, path: &TreePath) -> Option<&'a JsonValue> {
    path.segments()
        .iter()
        .try_fold(root, |node, key| node.as_object().and_then(|m| m.get(key)))
        .filter(|v| !v.is_null())
}

/// Write `value` at `path`, creating intermediate objects. Writing null
/// removes the key and prunes parents left empty.
fn write(root: &mut JsonValue, segments: &[String], value: JsonValue) {
    let Some((head, rest)) = segments.split_first() else {
        *root = value;
        return;
    };
    if !root.is_object() {
        if value.is_null() {
            return;
        }
        *root = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(map) = root {
        if rest.is_empty() {
            if value.is_null() {
                map.remove(head);
            } else {
                map.insert(head.clone(), value);
            }
        } else {
            let child = map.entry(head.clone()).or_insert(JsonValue::Null);
            write(child, rest, value);
            if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
                map.remove(head);
            }
        }
    }
}

#[async_trait]
impl TreeStore for InMemoryTreeStore {
    async fn read_once(&self, path: &TreePath) -> DataResult<Option<JsonValue>> {
        Ok(lookup(&self.root.read(), path).cloned())
    }

    async fn transaction(&self, path: &TreePath, update: TreeUpdateFn<'_>) -> DataResult<JsonValue> {
        let mut root = self.root.write();
        let next = update(lookup(&root, path));
        write(&mut root, path.segments(), next.clone());
        Ok(next)
    }

    async fn remove(&self, path: &TreePath) -> DataResult<()> {
        let mut root = self.root.write();
        write(&mut root, path.segments(), JsonValue::Null);
        Ok(())
    }

    fn ref_url(&self, path: &TreePath) -> String {
        format!("memory://{}", path)
    }
}
