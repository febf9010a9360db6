//! Storage seams
//!
//! The authorization services only talk to storage through these traits. One
//! trait per entity keeps adapters readable; [`AuthzStore`] ties them together
//! and adds transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::models::*;
use gatehouse_core::AppResult;

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn insert_organization(&self, org: &NewOrganization) -> AppResult<Organization>;

    /// Soft-deleted organizations are never returned.
    async fn find_organization(&self, id: i64) -> AppResult<Option<Organization>>;

    async fn find_organization_by_name(&self, name: &str) -> AppResult<Option<Organization>>;

    async fn update_organization(
        &self,
        id: i64,
        patch: &OrganizationPatch,
    ) -> AppResult<Option<Organization>>;

    async fn soft_delete_organization(&self, id: i64, at: DateTime<Utc>) -> AppResult<bool>;

    async fn list_organizations(&self, pagination: Pagination) -> AppResult<Page<Organization>>;

    /// Organizations where the user holds an active membership.
    async fn organizations_for_user(&self, user_id: i64) -> AppResult<Vec<Organization>>;
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn insert_team(&self, team: &NewTeam) -> AppResult<Team>;

    async fn find_team(&self, id: i64) -> AppResult<Option<Team>>;

    async fn update_team(&self, id: i64, patch: &TeamPatch) -> AppResult<Option<Team>>;

    /// Removes the team and its team-scoped bindings; memberships and
    /// invitations pinned to it are detached.
    async fn delete_team(&self, id: i64) -> AppResult<bool>;

    async fn list_teams(&self, organization_id: i64) -> AppResult<Vec<Team>>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn insert_role(&self, role: &NewRole, is_system: bool) -> AppResult<Role>;

    async fn find_role(&self, id: i64) -> AppResult<Option<Role>>;

    async fn find_roles(&self, ids: &[i64]) -> AppResult<Vec<Role>>;

    /// Exact scope lookup: `organization_id: None` only matches roles without
    /// an organization.
    async fn find_role_by_name(
        &self,
        name: &str,
        organization_id: Option<i64>,
    ) -> AppResult<Option<Role>>;

    async fn update_role(&self, id: i64, patch: &RolePatch) -> AppResult<Option<Role>>;

    async fn delete_role(&self, id: i64) -> AppResult<bool>;

    async fn list_roles(&self, query: &RoleQuery, pagination: Pagination) -> AppResult<Page<Role>>;

    /// Active default role of exactly this scope, lowest id first.
    async fn find_default_role(&self, organization_id: Option<i64>) -> AppResult<Option<Role>>;

    /// Active default roles of exactly this scope.
    async fn count_default_roles(&self, organization_id: Option<i64>) -> AppResult<i64>;

    /// Memberships, bindings (any scope) and pending invitations referencing the role.
    async fn role_usage(&self, role_id: i64) -> AppResult<i64>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn insert_permission(
        &self,
        permission: &NewPermission,
        is_system: bool,
    ) -> AppResult<Permission>;

    async fn find_permission(&self, id: i64) -> AppResult<Option<Permission>>;

    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>>;

    async fn find_permissions(&self, ids: &[i64]) -> AppResult<Vec<Permission>>;

    async fn update_permission(
        &self,
        id: i64,
        patch: &PermissionPatch,
    ) -> AppResult<Option<Permission>>;

    async fn delete_permission(&self, id: i64) -> AppResult<bool>;

    async fn list_permissions(
        &self,
        query: &PermissionQuery,
        pagination: Pagination,
    ) -> AppResult<Page<Permission>>;

    async fn all_permissions(&self) -> AppResult<Vec<Permission>>;

    /// Number of roles linked to the permission.
    async fn permission_link_count(&self, permission_id: i64) -> AppResult<i64>;

    async fn role_permissions(&self, role_id: i64) -> AppResult<Vec<Permission>>;

    /// Adds links; links that already exist are left alone.
    async fn link_permissions(
        &self,
        role_id: i64,
        permission_ids: &[i64],
        granted_by: Option<i64>,
    ) -> AppResult<()>;

    async fn unlink_permissions(&self, role_id: i64, permission_ids: &[i64]) -> AppResult<u64>;

    async fn clear_role_permissions(&self, role_id: i64) -> AppResult<u64>;

    /// Active roles among `role_ids`, each with the names of its active permissions.
    async fn role_grants(&self, role_ids: &[i64]) -> AppResult<Vec<RoleGrant>>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn insert_membership(&self, membership: &NewMembership) -> AppResult<Membership>;

    async fn find_membership(&self, id: i64) -> AppResult<Option<Membership>>;

    /// The user's membership in the organization, whatever its status.
    async fn find_user_membership(
        &self,
        user_id: i64,
        organization_id: i64,
    ) -> AppResult<Option<Membership>>;

    async fn update_membership(
        &self,
        id: i64,
        patch: &MembershipPatch,
    ) -> AppResult<Option<Membership>>;

    async fn delete_membership(&self, id: i64) -> AppResult<bool>;

    async fn list_memberships(
        &self,
        organization_id: i64,
        pagination: Pagination,
    ) -> AppResult<Page<Membership>>;

    async fn list_team_memberships(&self, team_id: i64) -> AppResult<Vec<Membership>>;

    async fn user_memberships(&self, user_id: i64) -> AppResult<Vec<Membership>>;
}

#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn insert_binding(&self, binding: &BindRequest) -> AppResult<RoleBinding>;

    async fn find_binding(
        &self,
        user_id: i64,
        role_id: i64,
        scope: BindingScope,
    ) -> AppResult<Option<RoleBinding>>;

    async fn delete_binding(&self, user_id: i64, role_id: i64, scope: BindingScope)
        -> AppResult<bool>;

    /// Every binding row of the user in every scope, live or not.
    async fn user_bindings(&self, user_id: i64) -> AppResult<Vec<RoleBinding>>;

    async fn role_bindings(&self, role_id: i64, scope: BindingScope) -> AppResult<Vec<RoleBinding>>;
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn insert_invitation(&self, invitation: &NewInvitation) -> AppResult<Invitation>;

    async fn find_invitation(&self, id: i64) -> AppResult<Option<Invitation>>;

    async fn find_invitation_by_token(&self, token: &str) -> AppResult<Option<Invitation>>;

    /// Move a pending invitation to `status`. `None` when the invitation is
    /// missing or no longer pending.
    async fn resolve_pending_invitation(
        &self,
        id: i64,
        status: InvitationStatus,
    ) -> AppResult<Option<Invitation>>;

    async fn list_invitations(
        &self,
        organization_id: i64,
        status: Option<InvitationStatus>,
    ) -> AppResult<Vec<Invitation>>;
}

/// The full storage collaborator.
#[async_trait]
pub trait AuthzStore:
    OrganizationStore
    + TeamStore
    + RoleStore
    + PermissionStore
    + MembershipStore
    + BindingStore
    + InvitationStore
    + Send
    + Sync
{
    /// Start a transaction. Work done through the returned handle becomes
    /// visible only on [`AuthzTransaction::commit`]; dropping the handle
    /// discards it.
    async fn begin(&self) -> AppResult<Box<dyn AuthzTransaction>>;
}

#[async_trait]
pub trait AuthzTransaction: AuthzStore {
    async fn commit(self: Box<Self>) -> AppResult<()>;

    async fn rollback(self: Box<Self>) -> AppResult<()>;
}
