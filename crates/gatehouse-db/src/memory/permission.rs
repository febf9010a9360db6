use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};

use super::MemoryAuthzStore;
use crate::store::PermissionStore;

#[async_trait]
impl PermissionStore for MemoryAuthzStore {
    async fn insert_permission(
        &self,
        permission: &NewPermission,
        is_system: bool,
    ) -> AppResult<Permission> {
        self.with_state(|s| {
            if s.permissions.values().any(|p| p.name == permission.name) {
                return Err(AppError::DuplicateName(format!(
                    "permission '{}' already exists",
                    permission.name
                )));
            }
            let now = Utc::now();
            let created = Permission {
                id: s.next_id(),
                name: permission.name.clone(),
                display_name: permission.display_name.clone(),
                description: permission.description.clone(),
                resource: permission.resource.clone(),
                action: permission.action.clone(),
                category: permission.category.clone(),
                is_system,
                status: EntityStatus::Active,
                created_at: now,
                updated_at: now,
            };
            s.permissions.insert(created.id, created.clone());
            Ok(created)
        })
        .await
    }

    async fn find_permission(&self, id: i64) -> AppResult<Option<Permission>> {
        self.with_state(|s| Ok(s.permissions.get(&id).cloned())).await
    }

    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>> {
        self.with_state(|s| Ok(s.permissions.values().find(|p| p.name == name).cloned()))
            .await
    }

    async fn find_permissions(&self, ids: &[i64]) -> AppResult<Vec<Permission>> {
        self.with_state(|s| {
            Ok(s.permissions
                .values()
                .filter(|p| ids.contains(&p.id))
                .cloned()
                .collect())
        })
        .await
    }

    async fn update_permission(
        &self,
        id: i64,
        patch: &PermissionPatch,
    ) -> AppResult<Option<Permission>> {
        self.with_state(|s| {
            let Some(permission) = s.permissions.get_mut(&id) else {
                return Ok(None);
            };
            if let Some(display_name) = &patch.display_name {
                permission.display_name = display_name.clone();
            }
            if let Some(description) = &patch.description {
                permission.description = Some(description.clone());
            }
            if let Some(resource) = &patch.resource {
                permission.resource = resource.clone();
            }
            if let Some(action) = &patch.action {
                permission.action = action.clone();
            }
            if let Some(category) = &patch.category {
                permission.category = category.clone();
            }
            if let Some(status) = patch.status {
                permission.status = status;
            }
            permission.updated_at = Utc::now();
            Ok(Some(permission.clone()))
        })
        .await
    }

    async fn delete_permission(&self, id: i64) -> AppResult<bool> {
        self.with_state(|s| {
            if s.permissions.remove(&id).is_none() {
                return Ok(false);
            }
            s.role_permissions.retain(|rp| rp.permission_id != id);
            Ok(true)
        })
        .await
    }

    async fn list_permissions(
        &self,
        query: &PermissionQuery,
        pagination: Pagination,
    ) -> AppResult<Page<Permission>> {
        self.with_state(|s| {
            let mut matching: Vec<Permission> = s
                .permissions
                .values()
                .filter(|p| query.matches(p))
                .cloned()
                .collect();
            matching.sort_by(|a, b| a.category.cmp(&b.category).then(a.name.cmp(&b.name)));
            Ok(Page::new(
                pagination.slice(&matching),
                matching.len() as i64,
                pagination,
            ))
        })
        .await
    }

    async fn all_permissions(&self) -> AppResult<Vec<Permission>> {
        self.with_state(|s| {
            let mut all: Vec<Permission> = s.permissions.values().cloned().collect();
            all.sort_by(|a, b| a.category.cmp(&b.category).then(a.name.cmp(&b.name)));
            Ok(all)
        })
        .await
    }

    async fn permission_link_count(&self, permission_id: i64) -> AppResult<i64> {
        self.with_state(|s| {
            Ok(s.role_permissions
                .iter()
                .filter(|rp| rp.permission_id == permission_id)
                .count() as i64)
        })
        .await
    }

    async fn role_permissions(&self, role_id: i64) -> AppResult<Vec<Permission>> {
        self.with_state(|s| {
            let mut linked: Vec<Permission> = s
                .role_permissions
                .iter()
                .filter(|rp| rp.role_id == role_id)
                .filter_map(|rp| s.permissions.get(&rp.permission_id))
                .cloned()
                .collect();
            linked.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(linked)
        })
        .await
    }

    async fn link_permissions(
        &self,
        role_id: i64,
        permission_ids: &[i64],
        granted_by: Option<i64>,
    ) -> AppResult<()> {
        self.with_state(|s| {
            let now = Utc::now();
            for &permission_id in permission_ids {
                let exists = s
                    .role_permissions
                    .iter()
                    .any(|rp| rp.role_id == role_id && rp.permission_id == permission_id);
                if !exists {
                    s.role_permissions.push(RolePermission {
                        role_id,
                        permission_id,
                        granted_by,
                        created_at: now,
                    });
                }
            }
            Ok(())
        })
        .await
    }

    async fn unlink_permissions(&self, role_id: i64, permission_ids: &[i64]) -> AppResult<u64> {
        self.with_state(|s| {
            let before = s.role_permissions.len();
            s.role_permissions
                .retain(|rp| !(rp.role_id == role_id && permission_ids.contains(&rp.permission_id)));
            Ok((before - s.role_permissions.len()) as u64)
        })
        .await
    }

    async fn clear_role_permissions(&self, role_id: i64) -> AppResult<u64> {
        self.with_state(|s| {
            let before = s.role_permissions.len();
            s.role_permissions.retain(|rp| rp.role_id != role_id);
            Ok((before - s.role_permissions.len()) as u64)
        })
        .await
    }

    async fn role_grants(&self, role_ids: &[i64]) -> AppResult<Vec<RoleGrant>> {
        self.with_state(|s| {
            Ok(s.roles
                .values()
                .filter(|r| role_ids.contains(&r.id) && r.is_active())
                .map(|role| {
                    let mut permissions: Vec<String> = s
                        .role_permissions
                        .iter()
                        .filter(|rp| rp.role_id == role.id)
                        .filter_map(|rp| s.permissions.get(&rp.permission_id))
                        .filter(|p| p.is_active())
                        .map(|p| p.name.clone())
                        .collect();
                    permissions.sort();
                    RoleGrant {
                        role: role.clone(),
                        permissions,
                    }
                })
                .collect())
        })
        .await
    }
}
