use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};

use super::MemoryAuthzStore;
use crate::store::BindingStore;

#[async_trait]
impl BindingStore for MemoryAuthzStore {
    async fn insert_binding(&self, binding: &BindRequest) -> AppResult<RoleBinding> {
        self.with_state(|s| {
            if s.bindings.values().any(|b| {
                b.user_id == binding.user_id
                    && b.role_id == binding.role_id
                    && b.scope == binding.scope
            }) {
                return Err(AppError::AlreadyBound(format!(
                    "user {} already holds role {} at {}",
                    binding.user_id, binding.role_id, binding.scope
                )));
            }
            let now = Utc::now();
            let created = RoleBinding {
                id: s.next_id(),
                user_id: binding.user_id,
                role_id: binding.role_id,
                scope: binding.scope,
                assigned_by: binding.assigned_by,
                expires_at: binding.expires_at,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            s.bindings.insert(created.id, created.clone());
            Ok(created)
        })
        .await
    }

    async fn find_binding(
        &self,
        user_id: i64,
        role_id: i64,
        scope: BindingScope,
    ) -> AppResult<Option<RoleBinding>> {
        self.with_state(|s| {
            Ok(s.bindings
                .values()
                .find(|b| b.user_id == user_id && b.role_id == role_id && b.scope == scope)
                .cloned())
        })
        .await
    }

    async fn delete_binding(
        &self,
        user_id: i64,
        role_id: i64,
        scope: BindingScope,
    ) -> AppResult<bool> {
        self.with_state(|s| {
            let before = s.bindings.len();
            s.bindings
                .retain(|_, b| !(b.user_id == user_id && b.role_id == role_id && b.scope == scope));
            Ok(s.bindings.len() < before)
        })
        .await
    }

    async fn user_bindings(&self, user_id: i64) -> AppResult<Vec<RoleBinding>> {
        self.with_state(|s| {
            Ok(s.bindings
                .values()
                .filter(|b| b.user_id == user_id)
                .cloned()
                .collect())
        })
        .await
    }

    async fn role_bindings(
        &self,
        role_id: i64,
        scope: BindingScope,
    ) -> AppResult<Vec<RoleBinding>> {
        self.with_state(|s| {
            Ok(s.bindings
                .values()
                .filter(|b| b.role_id == role_id && b.scope == scope)
                .cloned()
                .collect())
        })
        .await
    }
}

impl MemoryAuthzStore {
    /// Flip the active flag of a binding row. Used to stage stale rows in tests.
    pub async fn set_binding_active(&self, binding_id: i64, is_active: bool) -> AppResult<bool> {
        self.with_state(|s| match s.bindings.get_mut(&binding_id) {
            Some(binding) => {
                binding.is_active = is_active;
                binding.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }
}
