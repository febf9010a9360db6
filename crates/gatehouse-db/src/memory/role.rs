use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};

use super::{MemoryAuthzStore, MemoryState};
use crate::store::RoleStore;

fn name_taken(s: &MemoryState, name: &str, organization_id: Option<i64>, except: i64) -> bool {
    s.roles
        .values()
        .any(|r| r.id != except && r.name == name && r.organization_id == organization_id)
}

#[async_trait]
impl RoleStore for MemoryAuthzStore {
    async fn insert_role(&self, role: &NewRole, is_system: bool) -> AppResult<Role> {
        self.with_state(|s| {
            if name_taken(s, &role.name, role.organization_id, 0) {
                return Err(AppError::DuplicateName(format!(
                    "role '{}' already exists",
                    role.name
                )));
            }
            let now = Utc::now();
            let created = Role {
                id: s.next_id(),
                name: role.name.clone(),
                display_name: role.display_name.clone(),
                description: role.description.clone(),
                organization_id: role.organization_id,
                level: role.level,
                is_system,
                is_default: role.is_default,
                status: EntityStatus::Active,
                created_at: now,
                updated_at: now,
            };
            s.roles.insert(created.id, created.clone());
            Ok(created)
        })
        .await
    }

    async fn find_role(&self, id: i64) -> AppResult<Option<Role>> {
        self.with_state(|s| Ok(s.roles.get(&id).cloned())).await
    }

    async fn find_roles(&self, ids: &[i64]) -> AppResult<Vec<Role>> {
        self.with_state(|s| {
            Ok(s.roles
                .values()
                .filter(|r| ids.contains(&r.id))
                .cloned()
                .collect())
        })
        .await
    }

    async fn find_role_by_name(
        &self,
        name: &str,
        organization_id: Option<i64>,
    ) -> AppResult<Option<Role>> {
        self.with_state(|s| {
            Ok(s.roles
                .values()
                .find(|r| r.name == name && r.organization_id == organization_id)
                .cloned())
        })
        .await
    }

    async fn update_role(&self, id: i64, patch: &RolePatch) -> AppResult<Option<Role>> {
        self.with_state(|s| {
            let Some(organization_id) = s.roles.get(&id).map(|r| r.organization_id) else {
                return Ok(None);
            };
            if let Some(name) = &patch.name {
                if name_taken(s, name, organization_id, id) {
                    return Err(AppError::DuplicateName(format!(
                        "role '{name}' already exists"
                    )));
                }
            }
            let Some(role) = s.roles.get_mut(&id) else {
                return Ok(None);
            };
            if let Some(name) = &patch.name {
                role.name = name.clone();
            }
            if let Some(display_name) = &patch.display_name {
                role.display_name = display_name.clone();
            }
            if let Some(description) = &patch.description {
                role.description = Some(description.clone());
            }
            if let Some(level) = patch.level {
                role.level = level;
            }
            if let Some(is_default) = patch.is_default {
                role.is_default = is_default;
            }
            if let Some(status) = patch.status {
                role.status = status;
            }
            role.updated_at = Utc::now();
            Ok(Some(role.clone()))
        })
        .await
    }

    async fn delete_role(&self, id: i64) -> AppResult<bool> {
        self.with_state(|s| {
            if s.roles.remove(&id).is_none() {
                return Ok(false);
            }
            s.role_permissions.retain(|rp| rp.role_id != id);
            Ok(true)
        })
        .await
    }

    async fn list_roles(&self, query: &RoleQuery, pagination: Pagination) -> AppResult<Page<Role>> {
        self.with_state(|s| {
            let mut matching: Vec<Role> = s
                .roles
                .values()
                .filter(|r| query.matches(r))
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.level.cmp(&a.level).then(a.name.cmp(&b.name)));
            Ok(Page::new(
                pagination.slice(&matching),
                matching.len() as i64,
                pagination,
            ))
        })
        .await
    }

    async fn find_default_role(&self, organization_id: Option<i64>) -> AppResult<Option<Role>> {
        self.with_state(|s| {
            Ok(s.roles
                .values()
                .find(|r| r.is_default && r.is_active() && r.organization_id == organization_id)
                .cloned())
        })
        .await
    }

    async fn count_default_roles(&self, organization_id: Option<i64>) -> AppResult<i64> {
        self.with_state(|s| {
            Ok(s.roles
                .values()
                .filter(|r| r.is_default && r.is_active() && r.organization_id == organization_id)
                .count() as i64)
        })
        .await
    }

    async fn role_usage(&self, role_id: i64) -> AppResult<i64> {
        self.with_state(|s| {
            let memberships = s.memberships.values().filter(|m| m.role_id == role_id).count();
            let bindings = s.bindings.values().filter(|b| b.role_id == role_id).count();
            let invitations = s
                .invitations
                .values()
                .filter(|i| i.role_id == role_id && i.is_pending())
                .count();
            Ok((memberships + bindings + invitations) as i64)
        })
        .await
    }
}
