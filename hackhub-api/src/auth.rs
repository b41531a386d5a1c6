//! Authorization Context and ACL verification
//!
//! Identity verification happens upstream; this module receives the caller's
//! decoded privilege levels and decides whether a mapper operation may run.
//!
//! # Rule
//!
//! A request is allowed iff at least one of the caller's levels holds every
//! required capability (see [`Rbac::can_any`]). A denial is always the same
//! generic FORBIDDEN error. The capability that was checked is logged and
//! never returned.

use hackhub_core::{AuthLevel, DataError, DataResult, UserId};
use serde_json::Value as JsonValue;

use crate::rbac::{AclOperation, AclPermissions, Rbac};

// ============================================================================
// AUTH CONTEXT
// ============================================================================

/// Authenticated caller, built from identity-provider claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Identity-provider user id, if the request carried one
    pub user_id: Option<UserId>,

    /// Privilege levels held by the caller
    pub levels: Vec<AuthLevel>,
}

impl AuthContext {
    pub fn new(user_id: impl Into<UserId>, levels: Vec<AuthLevel>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            levels,
        }
    }

    /// Context from a numeric privilege claim.
    ///
    /// A missing or unrecognised claim falls back to PARTICIPANT.
    pub fn from_privilege(user_id: impl Into<UserId>, privilege: Option<i64>) -> Self {
        let level = privilege
            .and_then(AuthLevel::from_privilege)
            .unwrap_or(AuthLevel::Participant);
        Self::new(user_id, vec![level])
    }

    /// Context with no identity, used for internal jobs.
    pub fn anonymous(levels: Vec<AuthLevel>) -> Self {
        Self {
            user_id: None,
            levels,
        }
    }

    pub fn has_level(&self, level: AuthLevel) -> bool {
        self.levels.contains(&level)
    }

    /// RBAC role names for the held levels.
    pub fn role_names(&self) -> Vec<&'static str> {
        self.levels.iter().map(AuthLevel::role_name).collect()
    }
}

// ============================================================================
// VERIFICATION
// ============================================================================

/// Check that `ctx` may perform every operation in `operations` on the mapper
/// declaring `permissions`.
///
/// An operation the mapper does not declare is denied.
pub fn verify_acl(
    rbac: &Rbac,
    permissions: &dyn AclPermissions,
    operations: &[AclOperation],
    ctx: &AuthContext,
    params: Option<&JsonValue>,
) -> DataResult<()> {
    let mut capabilities = Vec::with_capacity(operations.len());
    for operation in operations {
        match permissions.permission(*operation) {
            Some(capability) => capabilities.push(capability),
            None => {
                tracing::info!(operation = ?operation, "operation not offered by mapper");
                return Err(DataError::forbidden());
            }
        }
    }
    tracing::info!(
        permission = %capabilities.join(","),
        roles = %ctx.role_names().join(","),
        "Requested permission"
    );

    if ctx.levels.is_empty() {
        return Err(DataError::forbidden());
    }
    if rbac.can_any(&ctx.role_names(), &capabilities, params) {
        Ok(())
    } else {
        tracing::debug!(permission = %capabilities.join(","), "permission denied");
        Err(DataError::forbidden())
    }
}
