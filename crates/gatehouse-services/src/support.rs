//! Lookups shared by the services. Generic over the store so they run the same
//! way on the shared handle and inside a transaction.

use gatehouse_core::catalog;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};
use gatehouse_db::prelude::*;

pub(crate) async fn require_organization<S: AuthzStore + ?Sized>(
    store: &S,
    organization_id: i64,
) -> AppResult<Organization> {
    store
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| AppError::OrganizationNotFound(format!("organization {organization_id}")))
}

pub(crate) async fn require_role<S: AuthzStore + ?Sized>(store: &S, role_id: i64) -> AppResult<Role> {
    store
        .find_role(role_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("role {role_id}")))
}

pub(crate) async fn require_team<S: AuthzStore + ?Sized>(store: &S, team_id: i64) -> AppResult<Team> {
    store
        .find_team(team_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("team {team_id}")))
}

/// The team must exist and belong to `organization_id`.
pub(crate) async fn require_team_in<S: AuthzStore + ?Sized>(
    store: &S,
    team_id: i64,
    organization_id: i64,
) -> AppResult<Team> {
    let team = require_team(store, team_id).await?;
    if team.organization_id != organization_id {
        return Err(AppError::InvalidInput(format!(
            "team {team_id} does not belong to organization {organization_id}"
        )));
    }
    Ok(team)
}

/// Role a new member of `organization_id` receives: the requested one, or the
/// organization's default, or the default template.
pub(crate) async fn resolve_member_role<S: AuthzStore + ?Sized>(
    store: &S,
    organization_id: i64,
    role_id: Option<i64>,
) -> AppResult<Role> {
    let role = match role_id {
        Some(role_id) => store
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::RoleNotFound(format!("role {role_id}")))?,
        None => match store.find_default_role(Some(organization_id)).await? {
            Some(role) => role,
            None => store.find_default_role(None).await?.ok_or_else(|| {
                AppError::RoleNotFound(format!(
                    "no default role configured for organization {organization_id}"
                ))
            })?,
        },
    };

    if !role.usable_in(organization_id) {
        return Err(AppError::RoleNotFound(format!(
            "role {} is not available in organization {organization_id}",
            role.id
        )));
    }
    Ok(role)
}

/// The wildcard sentinel permission, created on first use.
pub(crate) async fn ensure_wildcard<S: AuthzStore + ?Sized>(store: &S) -> AppResult<Permission> {
    match store
        .find_permission_by_name(WILDCARD_PERMISSION)
        .await?
    {
        Some(permission) => Ok(permission),
        None => {
            store
                .insert_permission(&catalog::wildcard_permission(), true)
                .await
        }
    }
}
