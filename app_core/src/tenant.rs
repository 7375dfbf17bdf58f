//! Tenant gate: resolves the effective tenant of every inbound operation
//! and enforces ownership on reads and writes.

use crate::{CoreError, CoreResult};
use displaydoc::Display;
use serde::{Deserialize, Serialize};

/// role of the calling principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// user
    User,
    /// admin
    Admin,
    /// superadmin
    Superadmin,
}

/// the authenticated caller as handed over by the (out of scope) session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
    /// superadmin hint: operate across all tenants (read-only)
    pub view_all: bool,
    /// superadmin hint: act as this tenant
    pub impersonate: Option<i64>,
}

/// tenant filter applied to every store query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantScope {
    /// superadmin view-all sentinel; writes are rejected in this mode
    All,
    /// rows of exactly this tenant
    Only(i64),
}

impl TenantScope {
    pub fn owns(&self, user_id: i64) -> bool {
        match self {
            TenantScope::All => true,
            TenantScope::Only(id) => *id == user_id,
        }
    }
}

/// outcome of tenant resolution, attached to every core operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveTenant {
    pub scope: TenantScope,
    pub view_all: bool,
    pub impersonating: bool,
}

impl EffectiveTenant {
    /// Resolve the effective tenant from the calling principal.
    ///
    /// Rules:
    /// - no principal fails with `Unauthorized`
    /// - impersonation is superadmin-only and wins over view-all
    /// - view-all is superadmin-only and yields the `All` sentinel scope
    pub fn resolve(principal: Option<&Principal>) -> CoreResult<Self> {
        let Some(p) = principal else {
            return Err(CoreError::Unauthorized("missing principal".into()));
        };

        if let Some(target) = p.impersonate {
            if p.role != Role::Superadmin {
                return Err(CoreError::Forbidden(
                    "impersonation requires superadmin".into(),
                ));
            }
            return Ok(EffectiveTenant {
                scope: TenantScope::Only(target),
                view_all: false,
                impersonating: true,
            });
        }

        if p.view_all {
            if p.role != Role::Superadmin {
                return Err(CoreError::Forbidden("view-all requires superadmin".into()));
            }
            return Ok(EffectiveTenant {
                scope: TenantScope::All,
                view_all: true,
                impersonating: false,
            });
        }

        Ok(EffectiveTenant {
            scope: TenantScope::Only(p.user_id),
            view_all: false,
            impersonating: false,
        })
    }

    /// Tenant id used for writes. View-all mode has no write identity.
    pub fn write_id(&self) -> CoreResult<i64> {
        match self.scope {
            TenantScope::Only(id) => Ok(id),
            TenantScope::All => Err(CoreError::Forbidden(
                "writes are rejected in view-all mode".into(),
            )),
        }
    }

    /// Ownership check for mutations against an already-loaded row.
    pub fn check_owns(&self, user_id: i64) -> CoreResult<()> {
        if self.scope.owns(user_id) {
            Ok(())
        } else {
            Err(CoreError::Forbidden("resource owned by another tenant".into()))
        }
    }
}
