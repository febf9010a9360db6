use serde::{Deserialize, Serialize};

use super::binding::BoundRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckPermissionRequest {
    pub user_id: i64,
    pub permission: String,
    pub organization_id: Option<i64>,
    pub team_id: Option<i64>,
}

impl CheckPermissionRequest {
    pub fn global(user_id: i64, permission: impl Into<String>) -> Self {
        Self {
            user_id,
            permission: permission.into(),
            organization_id: None,
            team_id: None,
        }
    }

    pub fn in_organization(mut self, organization_id: i64) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn in_team(mut self, team_id: i64) -> Self {
        self.team_id = Some(team_id);
        self
    }
}

/// Scope that granted a permission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionSource {
    Global,
    Organization,
    Team,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionCheck {
    pub allowed: bool,
    pub source: Option<PermissionSource>,
    /// Names of the roles that granted the permission at `source`.
    pub roles: Vec<String>,
    /// Granted through the super-admin override rather than a role grant.
    pub via_override: bool,
}

impl PermissionCheck {
    pub fn denied() -> Self {
        Self {
            allowed: false,
            source: None,
            roles: Vec::new(),
            via_override: false,
        }
    }

    pub fn granted(source: PermissionSource, roles: Vec<String>) -> Self {
        Self {
            allowed: true,
            source: Some(source),
            roles,
            via_override: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsSummary {
    pub user_id: i64,
    pub global_roles: Vec<BoundRole>,
    pub organization_roles: Vec<BoundRole>,
    pub team_roles: Vec<BoundRole>,
    pub global_permissions: Vec<String>,
    pub max_level: Option<i32>,
    pub is_super_admin: bool,
}
