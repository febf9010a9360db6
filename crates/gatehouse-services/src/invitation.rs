//! Invitation lifecycle
//!
//! `pending` moves exactly once to `accepted`, `rejected` or `expired`.
//! Expiry is noticed lazily: the first attempt to accept an invitation past
//! its deadline records `expired` and fails.

use std::sync::Arc;

use gatehouse_core::models::*;
use gatehouse_core::token::generate_invitation_token;
use gatehouse_core::{AppError, AppResult, Clock, GatehouseConfig};
use gatehouse_db::prelude::*;
use validator::Validate;

use crate::hooks::InvitationNotifier;
use crate::support::{require_organization, require_team_in, resolve_member_role};

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn AuthzStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn InvitationNotifier>,
    ttl: chrono::Duration,
    token_bytes: usize,
}

impl InvitationService {
    pub fn new(
        store: Arc<dyn AuthzStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn InvitationNotifier>,
        config: &GatehouseConfig,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            ttl: config.invitation_ttl(),
            token_bytes: config.invitation_token_bytes,
        }
    }

    #[tracing::instrument(skip(self, request), fields(organization_id = request.organization_id))]
    pub async fn invite_member(&self, request: InviteRequest) -> AppResult<Invitation> {
        request.validate()?;
        let store = self.store.as_ref();
        require_organization(store, request.organization_id).await?;
        if let Some(team_id) = request.team_id {
            require_team_in(store, team_id, request.organization_id).await?;
        }
        let role = resolve_member_role(store, request.organization_id, request.role_id).await?;

        let invitation = store
            .insert_invitation(&NewInvitation {
                email: request.email,
                organization_id: request.organization_id,
                team_id: request.team_id,
                role_id: role.id,
                invited_by: request.invited_by,
                token: generate_invitation_token(self.token_bytes),
                expires_at: self.clock.now() + self.ttl,
            })
            .await?;
        tracing::info!(
            invitation_id = invitation.id,
            role_id = role.id,
            expires_at = %invitation.expires_at,
            "Invitation created"
        );

        if let Err(e) = self.notifier.invitation_created(&invitation).await {
            tracing::warn!(error = %e, invitation_id = invitation.id, "Invitation notifier failed");
        }
        Ok(invitation)
    }

    /// Accept an invitation on behalf of `user_id`, creating an active
    /// membership with the invitation's role and team.
    #[tracing::instrument(skip(self, token))]
    pub async fn process_invitation(&self, token: &str, user_id: i64) -> AppResult<Membership> {
        let invitation = self
            .store
            .find_invitation_by_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound("invitation".to_string()))?;

        if !invitation.is_pending() {
            return Err(already_processed(&invitation));
        }

        let now = self.clock.now();
        if invitation.is_expired(now) {
            if self
                .store
                .resolve_pending_invitation(invitation.id, InvitationStatus::Expired)
                .await?
                .is_none()
            {
                return Err(self.settled_elsewhere(invitation.id).await);
            }
            tracing::info!(invitation_id = invitation.id, "Invitation expired");
            return Err(AppError::Expired(format!(
                "invitation expired at {}",
                invitation.expires_at
            )));
        }

        let tx = self.store.begin().await?;
        let invitation = tx
            .find_invitation(invitation.id)
            .await?
            .ok_or_else(|| AppError::NotFound("invitation".to_string()))?;
        if !invitation.is_pending() {
            return Err(already_processed(&invitation));
        }
        require_organization(&*tx, invitation.organization_id).await?;

        if tx
            .find_user_membership(user_id, invitation.organization_id)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyMember(format!(
                "user {user_id} is already a member of organization {}",
                invitation.organization_id
            )));
        }

        if tx
            .resolve_pending_invitation(invitation.id, InvitationStatus::Accepted)
            .await?
            .is_none()
        {
            return Err(AppError::AlreadyProcessed(format!(
                "invitation {} is no longer pending",
                invitation.id
            )));
        }
        let membership = tx
            .insert_membership(&NewMembership {
                user_id,
                organization_id: invitation.organization_id,
                team_id: invitation.team_id,
                role_id: invitation.role_id,
                status: MembershipStatus::Active,
                joined_at: Some(now),
                invited_by: Some(invitation.invited_by),
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            invitation_id = invitation.id,
            membership_id = membership.id,
            "Invitation accepted"
        );
        Ok(membership)
    }

    /// Withdraw a pending invitation. It ends up `rejected`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_invitation(&self, invitation_id: i64) -> AppResult<Invitation> {
        let invitation = self.get_invitation(invitation_id).await?;
        if !invitation.is_pending() {
            return Err(AppError::InvalidState(format!(
                "only pending invitations can be cancelled (status: {:?})",
                invitation.status
            )));
        }
        let cancelled = self
            .store
            .resolve_pending_invitation(invitation_id, InvitationStatus::Rejected)
            .await?
            .ok_or_else(|| {
                AppError::InvalidState(format!(
                    "invitation {invitation_id} was resolved concurrently"
                ))
            })?;
        tracing::info!(invitation_id, "Invitation cancelled");
        Ok(cancelled)
    }

    /// Error for an invitation another caller resolved between our read and
    /// our write.
    async fn settled_elsewhere(&self, invitation_id: i64) -> AppError {
        match self.store.find_invitation(invitation_id).await {
            Ok(Some(invitation)) => already_processed(&invitation),
            Ok(None) => AppError::NotFound(format!("invitation {invitation_id}")),
            Err(err) => err,
        }
    }

    pub async fn get_invitation(&self, invitation_id: i64) -> AppResult<Invitation> {
        self.store
            .find_invitation(invitation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("invitation {invitation_id}")))
    }

    pub async fn get_invitation_by_token(&self, token: &str) -> AppResult<Invitation> {
        self.store
            .find_invitation_by_token(token)
            .await?
            .ok_or_else(|| AppError::NotFound("invitation".to_string()))
    }

    pub async fn list_invitations(
        &self,
        organization_id: i64,
        status: Option<InvitationStatus>,
    ) -> AppResult<Vec<Invitation>> {
        require_organization(self.store.as_ref(), organization_id).await?;
        self.store.list_invitations(organization_id, status).await
    }
}

fn already_processed(invitation: &Invitation) -> AppError {
    AppError::AlreadyProcessed(format!(
        "invitation {} is already {:?}",
        invitation.id, invitation.status
    ))
}
