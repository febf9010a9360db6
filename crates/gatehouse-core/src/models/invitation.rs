use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::status::InvitationStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Invitation {
    pub id: i64,
    pub email: String,
    pub organization_id: i64,
    pub team_id: Option<i64>,
    pub role_id: i64,
    pub invited_by: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InviteRequest {
    #[validate(email)]
    pub email: String,
    pub organization_id: i64,
    pub team_id: Option<i64>,
    /// Falls back to the default role when absent.
    pub role_id: Option<i64>,
    pub invited_by: i64,
}

#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub email: String,
    pub organization_id: i64,
    pub team_id: Option<i64>,
    pub role_id: i64,
    pub invited_by: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let now = Utc::now();
        let invitation = Invitation {
            id: 1,
            email: "a@example.com".into(),
            organization_id: 1,
            team_id: None,
            role_id: 1,
            invited_by: 1,
            token: "t".into(),
            expires_at: now,
            status: InvitationStatus::Pending,
            created_at: now - Duration::days(7),
            updated_at: now - Duration::days(7),
        };
        assert!(invitation.is_expired(now));
        assert!(!invitation.is_expired(now - Duration::seconds(1)));
        assert!(invitation.is_pending());
        assert!(!invitation.status.is_terminal());
    }
}
