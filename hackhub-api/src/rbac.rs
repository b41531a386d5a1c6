//! Role-based access control
//!
//! Roles carry a set of opaque capability strings (`project:create`), an
//! optional set of inherited role names and an optional predicate evaluated
//! against caller-supplied parameters. Registering a role under an existing
//! name merges into it; sets only ever grow.
//!
//! Every answer is a plain `bool`. Raising the denial is the caller's job
//! (see [`crate::auth::verify_acl`]).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use hackhub_core::AuthLevel;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;

/// Custom check run when the role holding a capability is asked for it.
pub type RolePredicate = Arc<dyn Fn(Option<&JsonValue>) -> bool + Send + Sync>;

// ============================================================================
// ROLE
// ============================================================================

/// A named capability set.
#[derive(Clone)]
pub struct Role {
    pub name: String,
    pub capabilities: HashSet<String>,
    pub inherits: Option<HashSet<String>>,
    pub predicate: Option<RolePredicate>,
}

impl Role {
    pub fn new<I, S>(name: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            inherits: None,
            predicate: None,
        }
    }

    pub fn inheriting<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inherits
            .get_or_insert_with(HashSet::new)
            .extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_predicate(mut self, predicate: RolePredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Fold `other` into this role.
    ///
    /// Capability and inheritance sets are unioned. A predicate on `other`
    /// replaces this role's predicate; without one, the current predicate
    /// stays. Roles with different names are left untouched and `false` is
    /// returned.
    pub fn merge(&mut self, other: Role) -> bool {
        if self.name != other.name {
            return false;
        }
        self.capabilities.extend(other.capabilities);
        if let Some(inherits) = other.inherits {
            self.inherits.get_or_insert_with(HashSet::new).extend(inherits);
        }
        if other.predicate.is_some() {
            self.predicate = other.predicate;
        }
        true
    }

    fn grants(&self, operation: &str, params: Option<&JsonValue>) -> bool {
        self.capabilities.contains(operation)
            && self.predicate.as_ref().map_or(true, |check| check(params))
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Role")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("inherits", &self.inherits)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let capabilities: BTreeSet<_> = self.capabilities.iter().collect();
        write!(f, "{} {:?}", self.name, capabilities)?;
        if let Some(inherits) = &self.inherits {
            let inherits: BTreeSet<_> = inherits.iter().collect();
            write!(f, " inherits {:?}", inherits)?;
        }
        if self.predicate.is_some() {
            f.write_str(" (custom)")?;
        }
        Ok(())
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Role registry. Built once at startup and shared by reference.
#[derive(Default)]
pub struct Rbac {
    roles: RwLock<HashMap<String, Role>>,
}

impl Rbac {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `role`, or merge it into the registered role of the same name.
    pub fn register(&self, role: Role) {
        let mut roles = self.roles.write();
        match roles.get_mut(&role.name) {
            Some(existing) => {
                existing.merge(role);
            }
            None => {
                roles.insert(role.name.clone(), role);
            }
        }
    }

    /// Whether `role` holds `operation` directly or through inheritance, with
    /// the granting role's predicate (if any) satisfied by `params`.
    ///
    /// Unknown roles are denied. Inheritance cycles are tolerated.
    pub fn can(&self, role: &str, operation: &str, params: Option<&JsonValue>) -> bool {
        let roles = self.roles.read();
        let mut visited = HashSet::new();
        let mut pending = vec![role];
        while let Some(name) = pending.pop() {
            if !visited.insert(name) {
                continue;
            }
            let Some(current) = roles.get(name) else {
                continue;
            };
            if current.grants(operation, params) {
                return true;
            }
            if let Some(inherits) = &current.inherits {
                pending.extend(inherits.iter().map(String::as_str));
            }
        }
        false
    }

    /// Grant iff a single held role satisfies every required operation.
    ///
    /// An empty `operations` list grants to any caller holding at least one
    /// role.
    pub fn can_any<R: AsRef<str>, O: AsRef<str>>(
        &self,
        roles: &[R],
        operations: &[O],
        params: Option<&JsonValue>,
    ) -> bool {
        roles.iter().any(|role| {
            operations
                .iter()
                .all(|op| self.can(role.as_ref(), op.as_ref(), params))
        })
    }

    pub fn role(&self, name: &str) -> Option<Role> {
        self.roles.read().get(name).cloned()
    }

    pub fn role_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roles.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// One line per registered role, sorted by name.
    pub fn describe(&self) -> String {
        let roles = self.roles.read();
        let mut lines: Vec<String> = roles.values().map(ToString::to_string).collect();
        lines.sort();
        lines.join(" | ")
    }
}

impl fmt::Debug for Rbac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rbac").field("roles", &self.role_names()).finish()
    }
}

// ============================================================================
// MAPPER PERMISSIONS
// ============================================================================

/// Operation requested of a mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclOperation {
    Create,
    Update,
    Delete,
    Read,
    ReadAll,
    Count,
    MakeActive,
    AssignTable,
}

/// Capability strings a mapper declares for its operations.
pub trait AclPermissions: Send + Sync {
    /// Capability for `operation`, or `None` if the mapper does not offer it.
    fn permission(&self, operation: AclOperation) -> Option<&str>;
}

/// The six CRUD capabilities every mapper declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrudPermissions {
    pub create: String,
    pub update: String,
    pub delete: String,
    pub read: String,
    pub read_all: String,
    pub count: String,
}

impl CrudPermissions {
    /// `<prefix>:create`, `<prefix>:update`, ... `<prefix>:count`.
    pub fn for_prefix(prefix: &str) -> Self {
        Self {
            create: format!("{}:create", prefix),
            update: format!("{}:update", prefix),
            delete: format!("{}:delete", prefix),
            read: format!("{}:read", prefix),
            read_all: format!("{}:readall", prefix),
            count: format!("{}:count", prefix),
        }
    }
}

impl AclPermissions for CrudPermissions {
    fn permission(&self, operation: AclOperation) -> Option<&str> {
        match operation {
            AclOperation::Create => Some(&self.create),
            AclOperation::Update => Some(&self.update),
            AclOperation::Delete => Some(&self.delete),
            AclOperation::Read => Some(&self.read),
            AclOperation::ReadAll => Some(&self.read_all),
            AclOperation::Count => Some(&self.count),
            AclOperation::MakeActive | AclOperation::AssignTable => None,
        }
    }
}

/// Register `capabilities` for each of `levels`, optionally with a predicate
/// and inherited levels.
pub fn add_rbac(
    rbac: &Rbac,
    capabilities: &[&str],
    levels: &[AuthLevel],
    predicate: Option<RolePredicate>,
    inherits: &[AuthLevel],
) {
    for level in levels {
        let mut role = Role::new(level.role_name(), capabilities.iter().copied());
        if !inherits.is_empty() {
            role = role.inheriting(inherits.iter().map(|l| l.role_name()));
        }
        if let Some(predicate) = &predicate {
            role = role.with_predicate(Arc::clone(predicate));
        }
        rbac.register(role);
    }
}
