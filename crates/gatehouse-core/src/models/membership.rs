use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::MembershipStatus;

/// A user's membership in an organization, optionally pinned to one team.
/// A user has at most one membership per organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Membership {
    pub id: i64,
    pub user_id: i64,
    pub organization_id: i64,
    pub team_id: Option<i64>,
    pub role_id: i64,
    pub status: MembershipStatus,
    pub joined_at: Option<DateTime<Utc>>,
    pub invited_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }
}

/// Caller-facing request; `role_id: None` falls back to the default role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: i64,
    pub organization_id: i64,
    pub team_id: Option<i64>,
    pub role_id: Option<i64>,
    pub invited_by: Option<i64>,
}

/// Fully resolved row handed to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMembership {
    pub user_id: i64,
    pub organization_id: i64,
    pub team_id: Option<i64>,
    pub role_id: i64,
    pub status: MembershipStatus,
    pub joined_at: Option<DateTime<Utc>>,
    pub invited_by: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembershipPatch {
    pub team_id: Option<Option<i64>>,
    pub role_id: Option<i64>,
    pub status: Option<MembershipStatus>,
}
