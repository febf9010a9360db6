use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::Validate;

use super::status::EntityStatus;
use crate::error::AppError;

/// Name of the sentinel permission that grants everything.
pub const WILDCARD_PERMISSION: &str = "*";

static PERMISSION_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)+$").ok());

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
    pub category: String,
    pub is_system: bool,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == WILDCARD_PERMISSION
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewPermission {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub resource: String,
    #[validate(length(min = 1, max = 50))]
    pub action: String,
    #[validate(length(min = 1, max = 50))]
    pub category: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PermissionPatch {
    #[validate(length(min = 1, max = 255))]
    pub display_name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub resource: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub action: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,
    pub status: Option<EntityStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionQuery {
    pub search: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub category: Option<String>,
    pub status: Option<EntityStatus>,
}

impl PermissionQuery {
    pub fn matches(&self, permission: &Permission) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !permission.name.to_lowercase().contains(&needle)
                && !permission.display_name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.resource.as_ref().is_some_and(|r| *r != permission.resource) {
            return false;
        }
        if self.action.as_ref().is_some_and(|a| *a != permission.action) {
            return false;
        }
        if self.category.as_ref().is_some_and(|c| *c != permission.category) {
            return false;
        }
        if self.status.is_some_and(|s| s != permission.status) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: i64,
    pub permission_id: i64,
    pub granted_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Dotted `resource.action` form, or the wildcard.
pub fn is_valid_permission_name(name: &str) -> bool {
    name == WILDCARD_PERMISSION
        || PERMISSION_NAME
            .as_ref()
            .is_some_and(|re| re.is_match(name))
}

/// Permissions grouped by category, each group ordered by name.
pub fn group_by_category(permissions: Vec<Permission>) -> BTreeMap<String, Vec<Permission>> {
    let mut groups: BTreeMap<String, Vec<Permission>> = BTreeMap::new();
    for permission in permissions {
        groups
            .entry(permission.category.clone())
            .or_default()
            .push(permission);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.name.cmp(&b.name));
    }
    groups
}

/// Parse a legacy JSON permission map such as `{"*": true, "teams.read": true}`
/// into the names it grants. Entries set to `false` are skipped.
pub fn parse_legacy_permission_map(raw: &str) -> Result<Vec<String>, AppError> {
    let value: JsonValue = serde_json::from_str(raw)
        .map_err(|e| AppError::InvalidPermissionFormat(format!("not valid JSON: {e}")))?;

    let map = value.as_object().ok_or_else(|| {
        AppError::InvalidPermissionFormat("expected a JSON object".to_string())
    })?;

    let mut granted = Vec::new();
    for (name, flag) in map {
        let flag = flag.as_bool().ok_or_else(|| {
            AppError::InvalidPermissionFormat(format!("value for '{name}' is not a boolean"))
        })?;
        if !is_valid_permission_name(name) {
            return Err(AppError::InvalidPermissionFormat(format!(
                "'{name}' is not a permission name"
            )));
        }
        if flag {
            granted.push(name.clone());
        }
    }
    granted.sort();
    Ok(granted)
}
