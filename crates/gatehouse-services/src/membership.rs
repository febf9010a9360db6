//! Organizations, their teams and their members.

use std::collections::HashSet;
use std::sync::Arc;

use gatehouse_core::catalog;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult, Clock};
use gatehouse_db::prelude::*;
use validator::Validate;

use crate::support::{
    ensure_wildcard, require_organization, require_team, require_team_in, resolve_member_role,
};

const ADMIN_ROLE_LEVEL: i32 = 900;

#[derive(Clone)]
pub struct MembershipService {
    store: Arc<dyn AuthzStore>,
    clock: Arc<dyn Clock>,
}

impl MembershipService {
    pub fn new(store: Arc<dyn AuthzStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create an organization and make `creator_id` an active member holding
    /// its admin role. All of it commits together or not at all.
    #[tracing::instrument(skip(self, input), fields(organization.name = %input.name))]
    pub async fn create_organization(
        &self,
        input: NewOrganization,
        creator_id: i64,
    ) -> AppResult<(Organization, Membership)> {
        input.validate()?;
        if self
            .store
            .find_organization_by_name(&input.name)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateName(format!(
                "organization '{}' already exists",
                input.name
            )));
        }

        let tx = self.store.begin().await?;
        let organization = tx.insert_organization(&input).await?;

        let admin = match tx
            .find_role_by_name(catalog::ADMIN, Some(organization.id))
            .await?
        {
            Some(role) => role,
            None => match tx
                .find_role_by_name(catalog::ADMIN, None)
                .await?
                .filter(Role::is_active)
            {
                Some(role) => role,
                None => {
                    let wildcard = ensure_wildcard(&*tx).await?;
                    let role = tx
                        .insert_role(
                            &NewRole {
                                name: catalog::ADMIN.to_string(),
                                display_name: "Administrator".to_string(),
                                description: Some(format!(
                                    "Administrator of {}",
                                    organization.display_name
                                )),
                                organization_id: Some(organization.id),
                                level: ADMIN_ROLE_LEVEL,
                                is_default: false,
                            },
                            false,
                        )
                        .await?;
                    tx.link_permissions(role.id, &[wildcard.id], Some(creator_id))
                        .await?;
                    role
                }
            },
        };

        let membership = tx
            .insert_membership(&NewMembership {
                user_id: creator_id,
                organization_id: organization.id,
                team_id: None,
                role_id: admin.id,
                status: MembershipStatus::Active,
                joined_at: Some(self.clock.now()),
                invited_by: None,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            organization_id = organization.id,
            creator_id,
            admin_role_id = admin.id,
            "Organization created"
        );
        Ok((organization, membership))
    }

    pub async fn get_organization(&self, organization_id: i64) -> AppResult<Organization> {
        require_organization(self.store.as_ref(), organization_id).await
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update_organization(
        &self,
        organization_id: i64,
        patch: OrganizationPatch,
    ) -> AppResult<Organization> {
        patch.validate()?;
        self.store
            .update_organization(organization_id, &patch)
            .await?
            .ok_or_else(|| AppError::OrganizationNotFound(format!("organization {organization_id}")))
    }

    /// Soft delete. The organization disappears from reads but its rows stay.
    #[tracing::instrument(skip(self))]
    pub async fn delete_organization(&self, organization_id: i64) -> AppResult<()> {
        let deleted = self
            .store
            .soft_delete_organization(organization_id, self.clock.now())
            .await?;
        if !deleted {
            return Err(AppError::OrganizationNotFound(format!(
                "organization {organization_id}"
            )));
        }
        tracing::info!(organization_id, "Organization deleted");
        Ok(())
    }

    pub async fn list_organizations(&self, pagination: Pagination) -> AppResult<Page<Organization>> {
        self.store.list_organizations(pagination).await
    }

    /// Organizations where the user has an active membership.
    pub async fn user_organizations(&self, user_id: i64) -> AppResult<Vec<Organization>> {
        self.store.organizations_for_user(user_id).await
    }

    #[tracing::instrument(skip(self, input), fields(team.name = %input.name))]
    pub async fn create_team(&self, input: NewTeam) -> AppResult<Team> {
        input.validate()?;
        require_organization(self.store.as_ref(), input.organization_id).await?;
        if let Some(parent_id) = input.parent_id {
            require_team_in(self.store.as_ref(), parent_id, input.organization_id).await?;
        }
        let team = self.store.insert_team(&input).await?;
        tracing::info!(team_id = team.id, organization_id = team.organization_id, "Team created");
        Ok(team)
    }

    /// Teams cannot move between organizations, and re-parenting may not
    /// create a cycle.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_team(&self, team_id: i64, patch: TeamPatch) -> AppResult<Team> {
        patch.validate()?;
        let team = require_team(self.store.as_ref(), team_id).await?;

        if patch
            .organization_id
            .is_some_and(|o| o != team.organization_id)
        {
            return Err(AppError::InvalidInput(format!(
                "team {team_id} cannot move to another organization"
            )));
        }

        if let Some(Some(parent_id)) = patch.parent_id {
            self.check_parent(&team, parent_id).await?;
        }

        self.store
            .update_team(team_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("team {team_id}")))
    }

    /// Teams with sub-teams cannot be deleted. Bindings at the team go with
    /// it; memberships and invitations pinned to it fall back to the
    /// organization.
    #[tracing::instrument(skip(self))]
    pub async fn delete_team(&self, team_id: i64) -> AppResult<()> {
        let team = require_team(self.store.as_ref(), team_id).await?;
        let children = self
            .store
            .list_teams(team.organization_id)
            .await?
            .into_iter()
            .filter(|t| t.parent_id == Some(team_id))
            .count();
        if children > 0 {
            return Err(AppError::InUse(format!(
                "team '{}' still has {children} sub-team(s)",
                team.name
            )));
        }
        self.store.delete_team(team_id).await?;
        tracing::info!(team_id, "Team deleted");
        Ok(())
    }

    pub async fn get_team(&self, team_id: i64) -> AppResult<Team> {
        require_team(self.store.as_ref(), team_id).await
    }

    pub async fn list_teams(&self, organization_id: i64) -> AppResult<Vec<Team>> {
        require_organization(self.store.as_ref(), organization_id).await?;
        self.store.list_teams(organization_id).await
    }

    pub async fn team_hierarchy(&self, organization_id: i64) -> AppResult<Vec<TeamNode>> {
        let teams = self.list_teams(organization_id).await?;
        Ok(TeamNode::build_forest(&teams))
    }

    /// Add a user to an organization as an active member. Without an explicit
    /// role the organization's default role is used, then the default
    /// template.
    #[tracing::instrument(skip(self, request), fields(
        user_id = request.user_id,
        organization_id = request.organization_id,
    ))]
    pub async fn add_member(&self, request: AddMemberRequest) -> AppResult<Membership> {
        let store = self.store.as_ref();
        require_organization(store, request.organization_id).await?;
        if let Some(team_id) = request.team_id {
            require_team_in(store, team_id, request.organization_id).await?;
        }
        let role = resolve_member_role(store, request.organization_id, request.role_id).await?;

        if store
            .find_user_membership(request.user_id, request.organization_id)
            .await?
            .is_some()
        {
            return Err(AppError::AlreadyMember(format!(
                "user {} is already a member of organization {}",
                request.user_id, request.organization_id
            )));
        }

        let membership = store
            .insert_membership(&NewMembership {
                user_id: request.user_id,
                organization_id: request.organization_id,
                team_id: request.team_id,
                role_id: role.id,
                status: MembershipStatus::Active,
                joined_at: Some(self.clock.now()),
                invited_by: request.invited_by,
            })
            .await?;
        tracing::info!(membership_id = membership.id, role_id = role.id, "Member added");
        Ok(membership)
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update_member(&self, membership_id: i64, patch: MembershipPatch) -> AppResult<Membership> {
        let store = self.store.as_ref();
        let membership = self.require_membership(membership_id).await?;

        if let Some(role_id) = patch.role_id {
            resolve_member_role(store, membership.organization_id, Some(role_id)).await?;
        }
        if let Some(Some(team_id)) = patch.team_id {
            require_team_in(store, team_id, membership.organization_id).await?;
        }

        store
            .update_membership(membership_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("membership {membership_id}")))
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_member(&self, membership_id: i64) -> AppResult<()> {
        if !self.store.delete_membership(membership_id).await? {
            return Err(AppError::NotFound(format!("membership {membership_id}")));
        }
        tracing::info!(membership_id, "Member removed");
        Ok(())
    }

    /// The user's membership in the organization, whatever its status.
    pub async fn get_member(&self, organization_id: i64, user_id: i64) -> AppResult<Membership> {
        self.store
            .find_user_membership(user_id, organization_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "user {user_id} is not a member of organization {organization_id}"
                ))
            })
    }

    pub async fn list_members(
        &self,
        organization_id: i64,
        pagination: Pagination,
    ) -> AppResult<Page<Membership>> {
        require_organization(self.store.as_ref(), organization_id).await?;
        self.store.list_memberships(organization_id, pagination).await
    }

    pub async fn list_team_members(&self, team_id: i64) -> AppResult<Vec<Membership>> {
        require_team(self.store.as_ref(), team_id).await?;
        self.store.list_team_memberships(team_id).await
    }

    async fn require_membership(&self, membership_id: i64) -> AppResult<Membership> {
        self.store
            .find_membership(membership_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("membership {membership_id}")))
    }

    /// `parent_id` must be a team of the same organization that is not
    /// `team` itself or one of its descendants.
    async fn check_parent(&self, team: &Team, parent_id: i64) -> AppResult<()> {
        if parent_id == team.id {
            return Err(AppError::InvalidInput(format!(
                "team {} cannot be its own parent",
                team.id
            )));
        }
        let parent = require_team_in(self.store.as_ref(), parent_id, team.organization_id).await?;

        let mut seen = HashSet::new();
        let mut cursor = parent.parent_id;
        while let Some(ancestor_id) = cursor {
            if ancestor_id == team.id {
                return Err(AppError::InvalidInput(format!(
                    "moving team {} under team {parent_id} would create a cycle",
                    team.id
                )));
            }
            if !seen.insert(ancestor_id) {
                break;
            }
            cursor = self
                .store
                .find_team(ancestor_id)
                .await?
                .and_then(|t| t.parent_id);
        }
        Ok(())
    }
}
