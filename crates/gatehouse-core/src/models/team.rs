use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::status::EntityStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Team {
    pub id: i64,
    pub organization_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewTeam {
    pub organization_id: i64,
    pub parent_id: Option<i64>,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub display_name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// Partial update. `parent_id: Some(None)` detaches the team from its parent.
/// `organization_id` is accepted only to be rejected when it differs: teams
/// never move between organizations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TeamPatch {
    pub organization_id: Option<i64>,
    pub parent_id: Option<Option<i64>>,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub display_name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub status: Option<EntityStatus>,
}

/// A team and its descendants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamNode {
    #[serde(flatten)]
    pub team: Team,
    pub children: Vec<TeamNode>,
}

impl TeamNode {
    /// Build the forest of teams for one organization. Teams whose parent is
    /// missing from `teams` are treated as roots.
    pub fn build_forest(teams: &[Team]) -> Vec<TeamNode> {
        let ids: std::collections::HashSet<i64> = teams.iter().map(|t| t.id).collect();
        let mut roots: Vec<&Team> = teams
            .iter()
            .filter(|t| t.parent_id.map_or(true, |p| !ids.contains(&p)))
            .collect();
        roots.sort_by_key(|t| t.id);
        roots
            .into_iter()
            .map(|t| Self::build_node(t, teams, 0))
            .collect()
    }

    fn build_node(team: &Team, teams: &[Team], depth: usize) -> TeamNode {
        // Parent links are validated acyclic on write; the depth bound only
        // guards against rows written behind our back.
        let mut children: Vec<TeamNode> = if depth >= teams.len() {
            Vec::new()
        } else {
            teams
                .iter()
                .filter(|t| t.parent_id == Some(team.id) && t.id != team.id)
                .map(|t| Self::build_node(t, teams, depth + 1))
                .collect()
        };
        children.sort_by_key(|n| n.team.id);
        TeamNode {
            team: team.clone(),
            children,
        }
    }
}
