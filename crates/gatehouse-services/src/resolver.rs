//! Permission resolution
//!
//! A check walks global, then organization, then team scope and stops at the
//! first scope whose roles grant the permission. Only live bindings, active
//! roles and active permissions take part. When no scope grants it, the
//! super-admin override is consulted once; it is the only place the override
//! is evaluated.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatehouse_core::models::*;
use gatehouse_core::{AppResult, Clock};
use gatehouse_db::prelude::*;

use crate::bindings::pair_with_roles;

#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn AuthzStore>,
    clock: Arc<dyn Clock>,
    super_admin_role: String,
}

impl PermissionResolver {
    pub fn new(
        store: Arc<dyn AuthzStore>,
        clock: Arc<dyn Clock>,
        super_admin_role: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            super_admin_role: super_admin_role.into(),
        }
    }

    #[tracing::instrument(skip(self, request), fields(
        user_id = request.user_id,
        permission = %request.permission,
        organization_id = ?request.organization_id,
        team_id = ?request.team_id,
    ))]
    pub async fn check_permission(&self, request: &CheckPermissionRequest) -> AppResult<PermissionCheck> {
        let now = self.clock.now();
        let bindings = self.live_bindings(request.user_id, now).await?;

        let mut scopes = vec![(PermissionSource::Global, BindingScope::Global)];
        if let Some(organization_id) = request.organization_id {
            scopes.push((
                PermissionSource::Organization,
                BindingScope::Organization(organization_id),
            ));
        }
        if let Some(team_id) = request.team_id {
            scopes.push((PermissionSource::Team, BindingScope::Team(team_id)));
        }

        for (source, scope) in scopes {
            let role_ids = self.scope_role_ids(request.user_id, scope, &bindings).await?;
            let roles = self.granting_roles(&role_ids, &request.permission).await?;
            if !roles.is_empty() {
                tracing::debug!(source = ?source, roles = ?roles, "Permission granted");
                return Ok(PermissionCheck::granted(source, roles));
            }
        }

        if let Some(check) = self.super_admin_override(&bindings).await? {
            return Ok(check);
        }
        tracing::debug!("Permission denied");
        Ok(PermissionCheck::denied())
    }

    /// Global-scope check.
    pub async fn has_permission(&self, user_id: i64, permission: &str) -> AppResult<bool> {
        self.check_single_scope(user_id, permission, BindingScope::Global)
            .await
    }

    /// Check against the organization's roles only.
    pub async fn has_organization_permission(
        &self,
        user_id: i64,
        organization_id: i64,
        permission: &str,
    ) -> AppResult<bool> {
        self.check_single_scope(user_id, permission, BindingScope::Organization(organization_id))
            .await
    }

    /// Check against the team's roles only.
    pub async fn has_team_permission(
        &self,
        user_id: i64,
        team_id: i64,
        permission: &str,
    ) -> AppResult<bool> {
        self.check_single_scope(user_id, permission, BindingScope::Team(team_id))
            .await
    }

    /// De-duplicated permission names reachable at exactly `scope`. Other
    /// scopes are not folded in.
    pub async fn all_permissions(&self, user_id: i64, scope: BindingScope) -> AppResult<Vec<String>> {
        let now = self.clock.now();
        let bindings = self.live_bindings(user_id, now).await?;
        let role_ids = self.scope_role_ids(user_id, scope, &bindings).await?;
        let names: BTreeSet<String> = self
            .store
            .role_grants(&role_ids)
            .await?
            .into_iter()
            .flat_map(|grant| grant.permissions)
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Highest level among the active roles of the user's live bindings, at
    /// any scope. `None` when the user holds no such binding.
    pub async fn max_level(&self, user_id: i64) -> AppResult<Option<i32>> {
        let now = self.clock.now();
        let bindings = self.live_bindings(user_id, now).await?;
        let role_ids: Vec<i64> = bindings.iter().map(|b| b.role_id).collect();
        Ok(self
            .store
            .find_roles(&role_ids)
            .await?
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.level)
            .max())
    }

    pub async fn require_level(&self, user_id: i64, threshold: i32) -> AppResult<bool> {
        if self.max_level(user_id).await?.is_some_and(|level| level >= threshold) {
            return Ok(true);
        }
        self.is_super_admin(user_id).await
    }

    /// Whether the user holds a live binding, at any scope, to an active role
    /// with this name.
    pub async fn has_role(&self, user_id: i64, role_name: &str) -> AppResult<bool> {
        let now = self.clock.now();
        let bindings = self.live_bindings(user_id, now).await?;
        let role_ids: Vec<i64> = bindings.iter().map(|b| b.role_id).collect();
        let holds = self
            .store
            .find_roles(&role_ids)
            .await?
            .iter()
            .any(|r| r.is_active() && r.name == role_name);
        if holds {
            return Ok(true);
        }
        Ok(self.super_admin_override(&bindings).await?.is_some())
    }

    pub async fn is_super_admin(&self, user_id: i64) -> AppResult<bool> {
        let now = self.clock.now();
        let bindings = self.live_bindings(user_id, now).await?;
        Ok(self.super_admin_override(&bindings).await?.is_some())
    }

    pub async fn permissions_summary(&self, user_id: i64) -> AppResult<PermissionsSummary> {
        let now = self.clock.now();
        let bindings = self.live_bindings(user_id, now).await?;
        let is_super_admin = self.super_admin_override(&bindings).await?.is_some();

        let mut global_roles = Vec::new();
        let mut organization_roles = Vec::new();
        let mut team_roles = Vec::new();
        for bound in pair_with_roles(self.store.as_ref(), bindings).await? {
            match bound.binding.scope.kind() {
                ScopeKind::Global => global_roles.push(bound),
                ScopeKind::Organization => organization_roles.push(bound),
                ScopeKind::Team => team_roles.push(bound),
            }
        }

        Ok(PermissionsSummary {
            user_id,
            global_roles,
            organization_roles,
            team_roles,
            global_permissions: self.all_permissions(user_id, BindingScope::Global).await?,
            max_level: self.max_level(user_id).await?,
            is_super_admin,
        })
    }

    async fn check_single_scope(
        &self,
        user_id: i64,
        permission: &str,
        scope: BindingScope,
    ) -> AppResult<bool> {
        let now = self.clock.now();
        let bindings = self.live_bindings(user_id, now).await?;
        let role_ids = self.scope_role_ids(user_id, scope, &bindings).await?;
        if !self.granting_roles(&role_ids, permission).await?.is_empty() {
            return Ok(true);
        }
        Ok(self.super_admin_override(&bindings).await?.is_some())
    }

    async fn live_bindings(&self, user_id: i64, now: DateTime<Utc>) -> AppResult<Vec<RoleBinding>> {
        Ok(self
            .store
            .user_bindings(user_id)
            .await?
            .into_iter()
            .filter(|b| b.is_live(now))
            .collect())
    }

    /// Roles in effect at a scope: its live bindings, plus for organizations
    /// the active membership's role and for teams the roles of active
    /// memberships pinned to the team. A scope whose organization or team is
    /// missing, deleted or disabled contributes nothing.
    async fn scope_role_ids(
        &self,
        user_id: i64,
        scope: BindingScope,
        bindings: &[RoleBinding],
    ) -> AppResult<Vec<i64>> {
        let organization_id = match scope {
            BindingScope::Global => None,
            BindingScope::Organization(organization_id) => Some(organization_id),
            BindingScope::Team(team_id) => match self.store.find_team(team_id).await? {
                Some(team) if team.is_active() => Some(team.organization_id),
                _ => return Ok(Vec::new()),
            },
        };
        if let Some(organization_id) = organization_id {
            let live = self
                .store
                .find_organization(organization_id)
                .await?
                .is_some_and(|org| org.is_active());
            if !live {
                return Ok(Vec::new());
            }
        }

        let mut role_ids: Vec<i64> = bindings
            .iter()
            .filter(|b| b.scope == scope)
            .map(|b| b.role_id)
            .collect();

        match scope {
            BindingScope::Global => {}
            BindingScope::Organization(organization_id) => {
                if let Some(membership) = self
                    .store
                    .find_user_membership(user_id, organization_id)
                    .await?
                    .filter(Membership::is_active)
                {
                    role_ids.push(membership.role_id);
                }
            }
            BindingScope::Team(team_id) => {
                role_ids.extend(
                    self.store
                        .user_memberships(user_id)
                        .await?
                        .into_iter()
                        .filter(|m| m.is_active() && m.team_id == Some(team_id))
                        .map(|m| m.role_id),
                );
            }
        }

        role_ids.sort_unstable();
        role_ids.dedup();
        Ok(role_ids)
    }

    /// Names of the roles among `role_ids` that grant `permission`.
    async fn granting_roles(&self, role_ids: &[i64], permission: &str) -> AppResult<Vec<String>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .role_grants(role_ids)
            .await?
            .into_iter()
            .filter(|grant| grant.grants(permission))
            .map(|grant| grant.role.name)
            .collect())
    }

    /// A live global binding to the active super-admin role grants every
    /// check.
    async fn super_admin_override(&self, bindings: &[RoleBinding]) -> AppResult<Option<PermissionCheck>> {
        let global: Vec<i64> = bindings
            .iter()
            .filter(|b| b.scope == BindingScope::Global)
            .map(|b| b.role_id)
            .collect();
        if global.is_empty() {
            return Ok(None);
        }

        let holds = self
            .store
            .find_roles(&global)
            .await?
            .iter()
            .any(|r| r.is_active() && r.name == self.super_admin_role);
        if !holds {
            return Ok(None);
        }

        tracing::debug!(role = %self.super_admin_role, "Super-admin override applied");
        Ok(Some(PermissionCheck {
            allowed: true,
            source: Some(PermissionSource::Global),
            roles: vec![self.super_admin_role.clone()],
            via_override: true,
        }))
    }
}
