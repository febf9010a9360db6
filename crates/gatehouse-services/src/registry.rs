//! Role and permission registry
//!
//! CRUD over roles and permissions, role-permission links and seeding of the
//! built-in catalog. System roles and permissions are read-only through every
//! path here.

use std::collections::BTreeMap;
use std::sync::Arc;

use gatehouse_core::catalog::{self, ROLE_TEMPLATES, SYSTEM_ROLES};
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};
use gatehouse_db::prelude::*;
use validator::Validate;

use crate::support::{ensure_wildcard, require_organization, require_role};

#[derive(Clone)]
pub struct RoleRegistry {
    store: Arc<dyn AuthzStore>,
}

impl RoleRegistry {
    pub fn new(store: Arc<dyn AuthzStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, input), fields(role.name = %input.name))]
    pub async fn create_role(&self, input: NewRole) -> AppResult<Role> {
        input.validate()?;
        if let Some(organization_id) = input.organization_id {
            require_organization(self.store.as_ref(), organization_id).await?;
        }
        if self
            .store
            .find_role_by_name(&input.name, input.organization_id)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateName(format!(
                "role '{}' already exists",
                input.name
            )));
        }
        self.store.insert_role(&input, false).await
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update_role(&self, role_id: i64, patch: RolePatch) -> AppResult<Role> {
        patch.validate()?;
        let role = require_role(self.store.as_ref(), role_id).await?;
        if role.is_system {
            return Err(AppError::Immutable(format!(
                "system role '{}' cannot be modified",
                role.name
            )));
        }

        let loses_default = patch.is_default == Some(false)
            || patch.status.is_some_and(|status| status != EntityStatus::Active);
        if loses_default && role.is_default && role.is_active() {
            let defaults = self.store.count_default_roles(role.organization_id).await?;
            if defaults <= 1 {
                return Err(AppError::InUse(format!(
                    "role '{}' is the last default role in its scope",
                    role.name
                )));
            }
        }

        if let Some(name) = patch.name.as_deref().filter(|n| *n != role.name) {
            if self
                .store
                .find_role_by_name(name, role.organization_id)
                .await?
                .is_some()
            {
                return Err(AppError::DuplicateName(format!(
                    "role '{name}' already exists"
                )));
            }
        }

        let updated = self
            .store
            .update_role(role_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role {role_id}")))?;
        tracing::info!(role_id, "Role updated");
        Ok(updated)
    }

    /// Default roles can never be deleted, so every scope that had a default
    /// keeps one.
    #[tracing::instrument(skip(self))]
    pub async fn delete_role(&self, role_id: i64) -> AppResult<()> {
        let role = require_role(self.store.as_ref(), role_id).await?;
        if role.is_system {
            return Err(AppError::Immutable(format!(
                "system role '{}' cannot be deleted",
                role.name
            )));
        }
        if role.is_default {
            return Err(AppError::InUse(format!(
                "role '{}' is a default role",
                role.name
            )));
        }
        let usage = self.store.role_usage(role_id).await?;
        if usage > 0 {
            return Err(AppError::InUse(format!(
                "role '{}' is still referenced {usage} time(s)",
                role.name
            )));
        }
        self.store.delete_role(role_id).await?;
        Ok(())
    }

    pub async fn get_role(&self, role_id: i64) -> AppResult<Role> {
        require_role(self.store.as_ref(), role_id).await
    }

    /// Look a role up by name, preferring the organization's own role over a
    /// system role or template of the same name.
    pub async fn get_role_by_name(&self, name: &str, organization_id: Option<i64>) -> AppResult<Role> {
        if let Some(organization_id) = organization_id {
            if let Some(role) = self
                .store
                .find_role_by_name(name, Some(organization_id))
                .await?
            {
                return Ok(role);
            }
        }
        self.store
            .find_role_by_name(name, None)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{name}'")))
    }

    pub async fn list_roles(&self, query: RoleQuery, pagination: Pagination) -> AppResult<Page<Role>> {
        self.store.list_roles(&query, pagination).await
    }

    pub async fn role_with_permissions(&self, role_id: i64) -> AppResult<RoleWithPermissions> {
        let role = require_role(self.store.as_ref(), role_id).await?;
        let permissions = self.store.role_permissions(role_id).await?;
        Ok(RoleWithPermissions { role, permissions })
    }

    #[tracing::instrument(skip(self, input), fields(permission.name = %input.name))]
    pub async fn create_permission(&self, input: NewPermission) -> AppResult<Permission> {
        input.validate()?;
        if input.name == WILDCARD_PERMISSION {
            return Err(AppError::InvalidInput(
                "the wildcard permission is reserved".to_string(),
            ));
        }
        if !is_valid_permission_name(&input.name) {
            return Err(AppError::InvalidInput(format!(
                "'{}' is not a valid permission name (expected resource.action)",
                input.name
            )));
        }
        if self
            .store
            .find_permission_by_name(&input.name)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateName(format!(
                "permission '{}' already exists",
                input.name
            )));
        }
        self.store.insert_permission(&input, false).await
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update_permission(
        &self,
        permission_id: i64,
        patch: PermissionPatch,
    ) -> AppResult<Permission> {
        patch.validate()?;
        let permission = self.get_permission(permission_id).await?;
        if permission.is_system {
            return Err(AppError::Immutable(format!(
                "system permission '{}' cannot be modified",
                permission.name
            )));
        }
        self.store
            .update_permission(permission_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("permission {permission_id}")))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_permission(&self, permission_id: i64) -> AppResult<()> {
        let permission = self.get_permission(permission_id).await?;
        if permission.is_system {
            return Err(AppError::Immutable(format!(
                "system permission '{}' cannot be deleted",
                permission.name
            )));
        }
        let links = self.store.permission_link_count(permission_id).await?;
        if links > 0 {
            return Err(AppError::InUse(format!(
                "permission '{}' is granted by {links} role(s)",
                permission.name
            )));
        }
        self.store.delete_permission(permission_id).await?;
        Ok(())
    }

    pub async fn get_permission(&self, permission_id: i64) -> AppResult<Permission> {
        self.store
            .find_permission(permission_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("permission {permission_id}")))
    }

    pub async fn list_permissions(
        &self,
        query: PermissionQuery,
        pagination: Pagination,
    ) -> AppResult<Page<Permission>> {
        self.store.list_permissions(&query, pagination).await
    }

    pub async fn permissions_by_category(&self) -> AppResult<BTreeMap<String, Vec<Permission>>> {
        let all = self.store.all_permissions().await?;
        Ok(group_by_category(all))
    }

    /// Replace the role's permission set with exactly `permission_ids`. An
    /// empty list clears it. Readers see either the old or the new set.
    #[tracing::instrument(skip(self, permission_ids), fields(count = permission_ids.len()))]
    pub async fn assign_permissions_to_role(
        &self,
        role_id: i64,
        permission_ids: &[i64],
        granted_by: Option<i64>,
    ) -> AppResult<Vec<Permission>> {
        let mut ids = permission_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let tx = self.store.begin().await?;
        let role = require_role(&*tx, role_id).await?;
        if role.is_system {
            return Err(AppError::Immutable(format!(
                "permissions of system role '{}' cannot be changed",
                role.name
            )));
        }

        let found = tx.find_permissions(&ids).await?;
        if found.len() != ids.len() {
            let missing: Vec<i64> = ids
                .iter()
                .copied()
                .filter(|id| !found.iter().any(|p| p.id == *id))
                .collect();
            return Err(AppError::NotFound(format!("permissions {missing:?}")));
        }

        tx.clear_role_permissions(role_id).await?;
        tx.link_permissions(role_id, &ids, granted_by).await?;
        let permissions = tx.role_permissions(role_id).await?;
        tx.commit().await?;

        tracing::info!(role_id, count = permissions.len(), "Role permissions replaced");
        Ok(permissions)
    }

    /// Remove the named links. Links that do not exist are ignored.
    #[tracing::instrument(skip(self, permission_ids))]
    pub async fn remove_permissions_from_role(
        &self,
        role_id: i64,
        permission_ids: &[i64],
    ) -> AppResult<u64> {
        let role = require_role(self.store.as_ref(), role_id).await?;
        if role.is_system {
            return Err(AppError::Immutable(format!(
                "permissions of system role '{}' cannot be changed",
                role.name
            )));
        }
        self.store.unlink_permissions(role_id, permission_ids).await
    }

    /// Replace the role's permissions with the ones named in a legacy JSON
    /// permission map.
    #[tracing::instrument(skip(self, raw))]
    pub async fn import_legacy_permission_map(
        &self,
        role_id: i64,
        raw: &str,
        granted_by: Option<i64>,
    ) -> AppResult<Vec<Permission>> {
        let names = parse_legacy_permission_map(raw)?;
        let mut ids = Vec::with_capacity(names.len());
        for name in &names {
            let permission = if name == WILDCARD_PERMISSION {
                ensure_wildcard(self.store.as_ref()).await?
            } else {
                self.store
                    .find_permission_by_name(name)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("permission '{name}'")))?
            };
            ids.push(permission.id);
        }
        self.assign_permissions_to_role(role_id, &ids, granted_by)
            .await
    }

    /// Seed the system permissions, including the wildcard. Returns how many
    /// were created; existing rows are left alone.
    pub async fn initialize_system_permissions(&self) -> AppResult<usize> {
        let mut created = 0;
        for permission in catalog::system_permissions() {
            if self
                .store
                .find_permission_by_name(&permission.name)
                .await?
                .is_none()
            {
                self.store.insert_permission(&permission, true).await?;
                created += 1;
            }
        }
        if created > 0 {
            tracing::info!(created, "System permissions seeded");
        }
        Ok(created)
    }

    /// Seed the system roles and their grants. Roles that already exist keep
    /// their current links.
    pub async fn initialize_system_roles(&self) -> AppResult<usize> {
        self.initialize_system_permissions().await?;

        let mut created = 0;
        for system_role in SYSTEM_ROLES {
            if self
                .store
                .find_role_by_name(system_role.name, None)
                .await?
                .is_some()
            {
                continue;
            }

            let tx = self.store.begin().await?;
            let role = tx.insert_role(&system_role.to_new_role(), true).await?;
            let mut ids = Vec::with_capacity(system_role.grants.len());
            for name in system_role.grants {
                let permission = tx.find_permission_by_name(name).await?.ok_or_else(|| {
                    AppError::Internal(format!("catalog permission '{name}' is missing"))
                })?;
                ids.push(permission.id);
            }
            tx.link_permissions(role.id, &ids, None).await?;
            tx.commit().await?;
            created += 1;
        }
        if created > 0 {
            tracing::info!(created, "System roles seeded");
        }
        Ok(created)
    }

    /// Seed the organization role templates (owner, manager, member).
    pub async fn initialize_role_templates(&self) -> AppResult<usize> {
        let mut created = 0;
        for template in ROLE_TEMPLATES {
            if self
                .store
                .find_role_by_name(template.name, None)
                .await?
                .is_some()
            {
                continue;
            }
            let role = self.store.insert_role(&template.to_new_role(), false).await?;
            self.import_legacy_permission_map(role.id, template.permission_map, None)
                .await?;
            created += 1;
        }
        if created > 0 {
            tracing::info!(created, "Role templates seeded");
        }
        Ok(created)
    }

    pub async fn initialize_system_catalog(&self) -> AppResult<()> {
        self.initialize_system_permissions().await?;
        self.initialize_system_roles().await?;
        self.initialize_role_templates().await?;
        Ok(())
    }
}
