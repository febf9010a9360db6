use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};

use super::MemoryAuthzStore;
use crate::store::InvitationStore;

#[async_trait]
impl InvitationStore for MemoryAuthzStore {
    async fn insert_invitation(&self, invitation: &NewInvitation) -> AppResult<Invitation> {
        self.with_state(|s| {
            if s.invitations.values().any(|i| i.token == invitation.token) {
                return Err(AppError::Internal("invitation token collision".to_string()));
            }
            let now = Utc::now();
            let created = Invitation {
                id: s.next_id(),
                email: invitation.email.clone(),
                organization_id: invitation.organization_id,
                team_id: invitation.team_id,
                role_id: invitation.role_id,
                invited_by: invitation.invited_by,
                token: invitation.token.clone(),
                expires_at: invitation.expires_at,
                status: InvitationStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            s.invitations.insert(created.id, created.clone());
            Ok(created)
        })
        .await
    }

    async fn find_invitation(&self, id: i64) -> AppResult<Option<Invitation>> {
        self.with_state(|s| Ok(s.invitations.get(&id).cloned())).await
    }

    async fn find_invitation_by_token(&self, token: &str) -> AppResult<Option<Invitation>> {
        self.with_state(|s| Ok(s.invitations.values().find(|i| i.token == token).cloned()))
            .await
    }

    async fn resolve_pending_invitation(
        &self,
        id: i64,
        status: InvitationStatus,
    ) -> AppResult<Option<Invitation>> {
        self.with_state(|s| match s.invitations.get_mut(&id) {
            Some(invitation) if invitation.is_pending() => {
                invitation.status = status;
                invitation.updated_at = Utc::now();
                Ok(Some(invitation.clone()))
            }
            _ => Ok(None),
        })
        .await
    }

    async fn list_invitations(
        &self,
        organization_id: i64,
        status: Option<InvitationStatus>,
    ) -> AppResult<Vec<Invitation>> {
        self.with_state(|s| {
            Ok(s.invitations
                .values()
                .filter(|i| i.organization_id == organization_id)
                .filter(|i| status.map_or(true, |st| i.status == st))
                .cloned()
                .collect())
        })
        .await
    }
}
