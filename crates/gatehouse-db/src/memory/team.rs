use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};

use super::MemoryAuthzStore;
use crate::store::TeamStore;

#[async_trait]
impl TeamStore for MemoryAuthzStore {
    async fn insert_team(&self, team: &NewTeam) -> AppResult<Team> {
        self.with_state(|s| {
            if s
                .teams
                .values()
                .any(|t| t.organization_id == team.organization_id && t.name == team.name)
            {
                return Err(AppError::DuplicateName(format!(
                    "team '{}' already exists in organization {}",
                    team.name, team.organization_id
                )));
            }
            let now = Utc::now();
            let created = Team {
                id: s.next_id(),
                organization_id: team.organization_id,
                parent_id: team.parent_id,
                name: team.name.clone(),
                display_name: team.display_name.clone(),
                description: team.description.clone(),
                status: EntityStatus::Active,
                created_at: now,
                updated_at: now,
            };
            s.teams.insert(created.id, created.clone());
            Ok(created)
        })
        .await
    }

    async fn find_team(&self, id: i64) -> AppResult<Option<Team>> {
        self.with_state(|s| Ok(s.teams.get(&id).cloned())).await
    }

    async fn update_team(&self, id: i64, patch: &TeamPatch) -> AppResult<Option<Team>> {
        self.with_state(|s| {
            let Some(current) = s.teams.get(&id).cloned() else {
                return Ok(None);
            };
            if let Some(name) = &patch.name {
                if s.teams.values().any(|t| {
                    t.id != id && t.organization_id == current.organization_id && t.name == *name
                }) {
                    return Err(AppError::DuplicateName(format!(
                        "team '{}' already exists in organization {}",
                        name, current.organization_id
                    )));
                }
            }
            let Some(team) = s.teams.get_mut(&id) else {
                return Ok(None);
            };
            if let Some(parent_id) = patch.parent_id {
                team.parent_id = parent_id;
            }
            if let Some(name) = &patch.name {
                team.name = name.clone();
            }
            if let Some(display_name) = &patch.display_name {
                team.display_name = display_name.clone();
            }
            if let Some(description) = &patch.description {
                team.description = Some(description.clone());
            }
            if let Some(status) = patch.status {
                team.status = status;
            }
            team.updated_at = Utc::now();
            Ok(Some(team.clone()))
        })
        .await
    }

    async fn delete_team(&self, id: i64) -> AppResult<bool> {
        self.with_state(|s| {
            if s.teams.remove(&id).is_none() {
                return Ok(false);
            }
            s.bindings.retain(|_, b| b.scope != BindingScope::Team(id));
            for membership in s.memberships.values_mut() {
                if membership.team_id == Some(id) {
                    membership.team_id = None;
                }
            }
            for invitation in s.invitations.values_mut() {
                if invitation.team_id == Some(id) {
                    invitation.team_id = None;
                }
            }
            for team in s.teams.values_mut() {
                if team.parent_id == Some(id) {
                    team.parent_id = None;
                }
            }
            Ok(true)
        })
        .await
    }

    async fn list_teams(&self, organization_id: i64) -> AppResult<Vec<Team>> {
        self.with_state(|s| {
            Ok(s.teams
                .values()
                .filter(|t| t.organization_id == organization_id)
                .cloned()
                .collect())
        })
        .await
    }
}
