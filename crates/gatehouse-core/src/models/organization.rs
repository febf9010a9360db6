use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::Validate;

use super::status::EntityStatus;

/// Tenant root. Soft-deleted organizations keep their row (and `deleted_at`)
/// but are invisible to every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub status: EntityStatus,
    pub settings: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Organization {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active && !self.is_deleted()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewOrganization {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub settings: Option<JsonValue>,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct OrganizationPatch {
    #[validate(length(min = 1, max = 255))]
    pub display_name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub status: Option<EntityStatus>,
    pub settings: Option<JsonValue>,
}
