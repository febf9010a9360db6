use async_trait::async_trait;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};
use sqlx::Postgres;

use super::{db_error, is_unique_violation, PgAuthzStore};
use crate::store::TeamStore;

const TEAM_COLUMNS: &str =
    "id, organization_id, parent_id, name, display_name, description, status, created_at, updated_at";

fn duplicate_team(name: &str) -> AppError {
    AppError::DuplicateName(format!("team '{name}' already exists in this organization"))
}

#[async_trait]
impl TeamStore for PgAuthzStore {
    #[tracing::instrument(skip(self, team), fields(db.table = "teams", db.operation = "insert"))]
    async fn insert_team(&self, team: &NewTeam) -> AppResult<Team> {
        let mut conn = self.conn().await?;
        let created = sqlx::query_as::<Postgres, Team>(&format!(
            r#"
            INSERT INTO teams (organization_id, parent_id, name, display_name, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {TEAM_COLUMNS}
            "#
        ))
        .bind(team.organization_id)
        .bind(team.parent_id)
        .bind(&team.name)
        .bind(&team.display_name)
        .bind(&team.description)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_team(&team.name)
            } else {
                db_error("insert team")(e)
            }
        })?;

        tracing::info!(
            team_id = created.id,
            organization_id = created.organization_id,
            "Team created"
        );
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "teams", db.operation = "select"))]
    async fn find_team(&self, id: i64) -> AppResult<Option<Team>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Team>(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find team"))
    }

    #[tracing::instrument(skip(self, patch), fields(db.table = "teams", db.operation = "update"))]
    async fn update_team(&self, id: i64, patch: &TeamPatch) -> AppResult<Option<Team>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Team>(&format!(
            r#"
            UPDATE teams
            SET parent_id = CASE WHEN $2 THEN $3 ELSE parent_id END,
                name = COALESCE($4, name),
                display_name = COALESCE($5, display_name),
                description = COALESCE($6, description),
                status = COALESCE($7, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TEAM_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.parent_id.is_some())
        .bind(patch.parent_id.flatten())
        .bind(&patch.name)
        .bind(&patch.display_name)
        .bind(&patch.description)
        .bind(patch.status)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_team(patch.name.as_deref().unwrap_or_default())
            } else {
                db_error("update team")(e)
            }
        })
    }

    /// Team-scoped bindings cascade; memberships, invitations and child teams
    /// are detached by their `ON DELETE SET NULL` keys.
    #[tracing::instrument(skip(self), fields(db.table = "teams", db.operation = "delete"))]
    async fn delete_team(&self, id: i64) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(db_error("delete team"))?;

        if result.rows_affected() > 0 {
            tracing::info!(team_id = id, "Team deleted");
        }
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "teams", db.operation = "select"))]
    async fn list_teams(&self, organization_id: i64) -> AppResult<Vec<Team>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Team>(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams WHERE organization_id = $1 ORDER BY id"
        ))
        .bind(organization_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("list teams"))
    }
}
