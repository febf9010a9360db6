use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};

use super::MemoryAuthzStore;
use crate::store::MembershipStore;

#[async_trait]
impl MembershipStore for MemoryAuthzStore {
    async fn insert_membership(&self, membership: &NewMembership) -> AppResult<Membership> {
        self.with_state(|s| {
            if s.memberships.values().any(|m| {
                m.user_id == membership.user_id && m.organization_id == membership.organization_id
            }) {
                return Err(AppError::AlreadyMember(format!(
                    "user {} is already a member of organization {}",
                    membership.user_id, membership.organization_id
                )));
            }
            let now = Utc::now();
            let created = Membership {
                id: s.next_id(),
                user_id: membership.user_id,
                organization_id: membership.organization_id,
                team_id: membership.team_id,
                role_id: membership.role_id,
                status: membership.status,
                joined_at: membership.joined_at,
                invited_by: membership.invited_by,
                created_at: now,
                updated_at: now,
            };
            s.memberships.insert(created.id, created.clone());
            Ok(created)
        })
        .await
    }

    async fn find_membership(&self, id: i64) -> AppResult<Option<Membership>> {
        self.with_state(|s| Ok(s.memberships.get(&id).cloned())).await
    }

    async fn find_user_membership(
        &self,
        user_id: i64,
        organization_id: i64,
    ) -> AppResult<Option<Membership>> {
        self.with_state(|s| {
            Ok(s.memberships
                .values()
                .find(|m| m.user_id == user_id && m.organization_id == organization_id)
                .cloned())
        })
        .await
    }

    async fn update_membership(
        &self,
        id: i64,
        patch: &MembershipPatch,
    ) -> AppResult<Option<Membership>> {
        self.with_state(|s| {
            let Some(membership) = s.memberships.get_mut(&id) else {
                return Ok(None);
            };
            if let Some(team_id) = patch.team_id {
                membership.team_id = team_id;
            }
            if let Some(role_id) = patch.role_id {
                membership.role_id = role_id;
            }
            if let Some(status) = patch.status {
                if status == MembershipStatus::Active && membership.joined_at.is_none() {
                    membership.joined_at = Some(Utc::now());
                }
                membership.status = status;
            }
            membership.updated_at = Utc::now();
            Ok(Some(membership.clone()))
        })
        .await
    }

    async fn delete_membership(&self, id: i64) -> AppResult<bool> {
        self.with_state(|s| Ok(s.memberships.remove(&id).is_some()))
            .await
    }

    async fn list_memberships(
        &self,
        organization_id: i64,
        pagination: Pagination,
    ) -> AppResult<Page<Membership>> {
        self.with_state(|s| {
            let matching: Vec<Membership> = s
                .memberships
                .values()
                .filter(|m| m.organization_id == organization_id)
                .cloned()
                .collect();
            Ok(Page::new(
                pagination.slice(&matching),
                matching.len() as i64,
                pagination,
            ))
        })
        .await
    }

    async fn list_team_memberships(&self, team_id: i64) -> AppResult<Vec<Membership>> {
        self.with_state(|s| {
            Ok(s.memberships
                .values()
                .filter(|m| m.team_id == Some(team_id))
                .cloned()
                .collect())
        })
        .await
    }

    async fn user_memberships(&self, user_id: i64) -> AppResult<Vec<Membership>> {
        self.with_state(|s| {
            Ok(s.memberships
                .values()
                .filter(|m| m.user_id == user_id)
                .cloned()
                .collect())
        })
        .await
    }
}
