use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::permission::Permission;
use super::status::EntityStatus;

/// A named bundle of permissions with a numeric level.
///
/// * system roles: `is_system`, no organization, seeded and immutable
/// * templates: not system, no organization, usable in every organization
/// * organization roles: owned by exactly one organization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub organization_id: Option<i64>,
    pub level: i32,
    pub is_system: bool,
    pub is_default: bool,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active
    }

    /// Whether this role may be granted inside `organization_id`.
    pub fn usable_in(&self, organization_id: i64) -> bool {
        self.organization_id.map_or(true, |o| o == organization_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewRole {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub organization_id: Option<i64>,
    #[validate(range(min = 0, max = 10000))]
    pub level: i32,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RolePatch {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub display_name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(range(min = 0, max = 10000))]
    pub level: Option<i32>,
    pub is_default: Option<bool>,
    pub status: Option<EntityStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleQuery {
    /// Restrict to roles usable in this organization (its own roles plus
    /// system roles and templates).
    pub organization_id: Option<i64>,
    /// Case-insensitive match on name or display name.
    pub search: Option<String>,
    pub status: Option<EntityStatus>,
    pub is_system: Option<bool>,
    pub min_level: Option<i32>,
}

impl RoleQuery {
    pub fn matches(&self, role: &Role) -> bool {
        if let Some(org) = self.organization_id {
            if !role.usable_in(org) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !role.name.to_lowercase().contains(&needle)
                && !role.display_name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != role.status) {
            return false;
        }
        if self.is_system.is_some_and(|s| s != role.is_system) {
            return false;
        }
        if self.min_level.is_some_and(|l| role.level < l) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// An active role together with the names of its active permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: Role,
    pub permissions: Vec<String>,
}

impl RoleGrant {
    /// A role grants `permission` when it is linked to it directly or to the
    /// wildcard.
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == permission || p == super::permission::WILDCARD_PERMISSION)
    }
}
