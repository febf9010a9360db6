//! Role bindings at global, organization and team scope.

use std::sync::Arc;

use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult, Clock};
use gatehouse_db::prelude::*;

use crate::support::{require_organization, require_role, require_team};

#[derive(Clone)]
pub struct BindingManager {
    store: Arc<dyn AuthzStore>,
    clock: Arc<dyn Clock>,
}

impl BindingManager {
    pub fn new(store: Arc<dyn AuthzStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Bind a role to a user at a scope. A stale row for the same triple
    /// (inactive or expired) is replaced; a live one is an error.
    #[tracing::instrument(skip(self, request), fields(
        user_id = request.user_id,
        role_id = request.role_id,
        scope = %request.scope,
    ))]
    pub async fn bind(&self, request: BindRequest) -> AppResult<RoleBinding> {
        let now = self.clock.now();
        if request.expires_at.is_some_and(|at| at <= now) {
            return Err(AppError::InvalidInput(
                "binding expiry must be in the future".to_string(),
            ));
        }

        let tx = self.store.begin().await?;
        let role = require_role(&*tx, request.role_id).await?;
        check_scope(&*tx, &role, request.scope).await?;

        if let Some(existing) = tx
            .find_binding(request.user_id, request.role_id, request.scope)
            .await?
        {
            if existing.is_live(now) {
                return Err(AppError::AlreadyBound(format!(
                    "user {} already holds role '{}' at {}",
                    request.user_id, role.name, request.scope
                )));
            }
            tx.delete_binding(request.user_id, request.role_id, request.scope)
                .await?;
            tracing::debug!(binding_id = existing.id, "Replacing stale binding");
        }

        let binding = tx.insert_binding(&request).await?;
        tx.commit().await?;

        tracing::info!(binding_id = binding.id, "Role bound");
        Ok(binding)
    }

    /// Bind several roles at once. Roles that fail to bind are logged and
    /// skipped; the bindings that were created are returned.
    pub async fn bind_many(
        &self,
        user_id: i64,
        role_ids: &[i64],
        scope: BindingScope,
        assigned_by: Option<i64>,
    ) -> AppResult<Vec<RoleBinding>> {
        let mut created = Vec::with_capacity(role_ids.len());
        for &role_id in role_ids {
            let request = BindRequest {
                user_id,
                role_id,
                scope,
                assigned_by,
                expires_at: None,
            };
            match self.bind(request).await {
                Ok(binding) => created.push(binding),
                Err(e) => {
                    tracing::warn!(error = %e, user_id, role_id, scope = %scope, "Skipping role binding");
                }
            }
        }
        Ok(created)
    }

    /// Returns whether a binding row was removed.
    #[tracing::instrument(skip(self))]
    pub async fn unbind(&self, user_id: i64, role_id: i64, scope: BindingScope) -> AppResult<bool> {
        let removed = self.store.delete_binding(user_id, role_id, scope).await?;
        if removed {
            tracing::info!(user_id, role_id, scope = %scope, "Role unbound");
        }
        Ok(removed)
    }

    /// Live bindings of the user at exactly this scope, each with its role.
    pub async fn list_bindings(&self, user_id: i64, scope: BindingScope) -> AppResult<Vec<BoundRole>> {
        let now = self.clock.now();
        let bindings: Vec<RoleBinding> = self
            .store
            .user_bindings(user_id)
            .await?
            .into_iter()
            .filter(|b| b.scope == scope && b.is_live(now))
            .collect();
        pair_with_roles(self.store.as_ref(), bindings).await
    }

    pub async fn is_bound(&self, user_id: i64, role_id: i64, scope: BindingScope) -> AppResult<bool> {
        let now = self.clock.now();
        Ok(self
            .store
            .find_binding(user_id, role_id, scope)
            .await?
            .is_some_and(|b| b.is_live(now)))
    }

    /// Users holding a live binding to the role at the scope, ascending.
    pub async fn users_with_role(&self, role_id: i64, scope: BindingScope) -> AppResult<Vec<i64>> {
        let now = self.clock.now();
        let mut users: Vec<i64> = self
            .store
            .role_bindings(role_id, scope)
            .await?
            .into_iter()
            .filter(|b| b.is_live(now))
            .map(|b| b.user_id)
            .collect();
        users.sort_unstable();
        users.dedup();
        Ok(users)
    }
}

/// An organization role may only be bound inside its own organization.
async fn check_scope<S: AuthzStore + ?Sized>(
    store: &S,
    role: &Role,
    scope: BindingScope,
) -> AppResult<()> {
    let organization_id = match scope {
        BindingScope::Global => None,
        BindingScope::Organization(organization_id) => {
            require_organization(store, organization_id).await?;
            Some(organization_id)
        }
        BindingScope::Team(team_id) => {
            let team = require_team(store, team_id).await?;
            require_organization(store, team.organization_id).await?;
            Some(team.organization_id)
        }
    };

    let compatible = match (role.organization_id, organization_id) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(owner), Some(target)) => owner == target,
    };
    if !compatible {
        return Err(AppError::InvalidInput(format!(
            "role '{}' cannot be bound at {scope}",
            role.name
        )));
    }
    Ok(())
}

pub(crate) async fn pair_with_roles<S: AuthzStore + ?Sized>(
    store: &S,
    bindings: Vec<RoleBinding>,
) -> AppResult<Vec<BoundRole>> {
    let role_ids: Vec<i64> = bindings.iter().map(|b| b.role_id).collect();
    let roles = store.find_roles(&role_ids).await?;
    let mut bound: Vec<BoundRole> = bindings
        .into_iter()
        .filter_map(|binding| {
            roles
                .iter()
                .find(|r| r.id == binding.role_id)
                .cloned()
                .map(|role| BoundRole { binding, role })
        })
        .collect();
    bound.sort_by_key(|b| b.binding.id);
    Ok(bound)
}
