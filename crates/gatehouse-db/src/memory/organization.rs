use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};

use super::MemoryAuthzStore;
use crate::store::OrganizationStore;

#[async_trait]
impl OrganizationStore for MemoryAuthzStore {
    async fn insert_organization(&self, org: &NewOrganization) -> AppResult<Organization> {
        self.with_state(|s| {
            if s
                .organizations
                .values()
                .any(|o| o.name == org.name && !o.is_deleted())
            {
                return Err(AppError::DuplicateName(format!(
                    "organization '{}' already exists",
                    org.name
                )));
            }
            let now = Utc::now();
            let created = Organization {
                id: s.next_id(),
                name: org.name.clone(),
                display_name: org.display_name.clone(),
                description: org.description.clone(),
                status: EntityStatus::Active,
                settings: org
                    .settings
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({})),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            };
            s.organizations.insert(created.id, created.clone());
            Ok(created)
        })
        .await
    }

    async fn find_organization(&self, id: i64) -> AppResult<Option<Organization>> {
        self.with_state(|s| {
            Ok(s.organizations
                .get(&id)
                .filter(|o| !o.is_deleted())
                .cloned())
        })
        .await
    }

    async fn find_organization_by_name(&self, name: &str) -> AppResult<Option<Organization>> {
        self.with_state(|s| {
            Ok(s.organizations
                .values()
                .find(|o| o.name == name && !o.is_deleted())
                .cloned())
        })
        .await
    }

    async fn update_organization(
        &self,
        id: i64,
        patch: &OrganizationPatch,
    ) -> AppResult<Option<Organization>> {
        self.with_state(|s| {
            let Some(org) = s.organizations.get_mut(&id).filter(|o| !o.is_deleted()) else {
                return Ok(None);
            };
            if let Some(display_name) = &patch.display_name {
                org.display_name = display_name.clone();
            }
            if let Some(description) = &patch.description {
                org.description = Some(description.clone());
            }
            if let Some(status) = patch.status {
                org.status = status;
            }
            if let Some(settings) = &patch.settings {
                org.settings = settings.clone();
            }
            org.updated_at = Utc::now();
            Ok(Some(org.clone()))
        })
        .await
    }

    async fn soft_delete_organization(&self, id: i64, at: DateTime<Utc>) -> AppResult<bool> {
        self.with_state(|s| {
            match s.organizations.get_mut(&id).filter(|o| !o.is_deleted()) {
                Some(org) => {
                    org.deleted_at = Some(at);
                    org.updated_at = at;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
    }

    async fn list_organizations(&self, pagination: Pagination) -> AppResult<Page<Organization>> {
        self.with_state(|s| {
            let live: Vec<Organization> = s
                .organizations
                .values()
                .filter(|o| !o.is_deleted())
                .cloned()
                .collect();
            Ok(Page::new(
                pagination.slice(&live),
                live.len() as i64,
                pagination,
            ))
        })
        .await
    }

    async fn organizations_for_user(&self, user_id: i64) -> AppResult<Vec<Organization>> {
        self.with_state(|s| {
            Ok(s.organizations
                .values()
                .filter(|o| !o.is_deleted())
                .filter(|o| {
                    s.memberships.values().any(|m| {
                        m.user_id == user_id && m.organization_id == o.id && m.is_active()
                    })
                })
                .cloned()
                .collect())
        })
        .await
    }
}
