use async_trait::async_trait;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};
use sqlx::Postgres;

use super::{db_error, is_unique_violation, PgAuthzStore};
use crate::store::InvitationStore;

const INVITATION_COLUMNS: &str = "id, email, organization_id, team_id, role_id, invited_by, token, expires_at, status, created_at, updated_at";

#[async_trait]
impl InvitationStore for PgAuthzStore {
    #[tracing::instrument(skip(self, invitation), fields(db.table = "invitations", db.operation = "insert"))]
    async fn insert_invitation(&self, invitation: &NewInvitation) -> AppResult<Invitation> {
        let mut conn = self.conn().await?;
        let created = sqlx::query_as::<Postgres, Invitation>(&format!(
            r#"
            INSERT INTO invitations (email, organization_id, team_id, role_id, invited_by, token, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(&invitation.email)
        .bind(invitation.organization_id)
        .bind(invitation.team_id)
        .bind(invitation.role_id)
        .bind(invitation.invited_by)
        .bind(&invitation.token)
        .bind(invitation.expires_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Internal("invitation token collision".to_string())
            } else {
                db_error("insert invitation")(e)
            }
        })?;

        tracing::info!(
            invitation_id = created.id,
            organization_id = created.organization_id,
            "Invitation created"
        );
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "invitations", db.operation = "select"))]
    async fn find_invitation(&self, id: i64) -> AppResult<Option<Invitation>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find invitation"))
    }

    #[tracing::instrument(skip(self, token), fields(db.table = "invitations", db.operation = "select"))]
    async fn find_invitation_by_token(&self, token: &str) -> AppResult<Option<Invitation>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Invitation>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find invitation by token"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "invitations", db.operation = "update"))]
    async fn resolve_pending_invitation(
        &self,
        id: i64,
        status: InvitationStatus,
    ) -> AppResult<Option<Invitation>> {
        let mut conn = self.conn().await?;
        let updated = sqlx::query_as::<Postgres, Invitation>(&format!(
            r#"
            UPDATE invitations SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {INVITATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("resolve pending invitation"))?;

        if updated.is_some() {
            tracing::info!(invitation_id = id, ?status, "Invitation status changed");
        }
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(db.table = "invitations", db.operation = "select"))]
    async fn list_invitations(
        &self,
        organization_id: i64,
        status: Option<InvitationStatus>,
    ) -> AppResult<Vec<Invitation>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Invitation>(&format!(
            r#"
            SELECT {INVITATION_COLUMNS} FROM invitations
            WHERE organization_id = $1 AND ($2::invitation_status IS NULL OR status = $2)
            ORDER BY id
            "#
        ))
        .bind(organization_id)
        .bind(status)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("list invitations"))
    }
}
