use async_trait::async_trait;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};
use sqlx::Postgres;

use super::{db_error, is_unique_violation, PgAuthzStore};
use crate::store::MembershipStore;

const MEMBERSHIP_COLUMNS: &str = "id, user_id, organization_id, team_id, role_id, status, joined_at, invited_by, created_at, updated_at";

#[async_trait]
impl MembershipStore for PgAuthzStore {
    #[tracing::instrument(skip(self, membership), fields(db.table = "memberships", db.operation = "insert"))]
    async fn insert_membership(&self, membership: &NewMembership) -> AppResult<Membership> {
        let mut conn = self.conn().await?;
        let created = sqlx::query_as::<Postgres, Membership>(&format!(
            r#"
            INSERT INTO memberships (user_id, organization_id, team_id, role_id, status, joined_at, invited_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(membership.user_id)
        .bind(membership.organization_id)
        .bind(membership.team_id)
        .bind(membership.role_id)
        .bind(membership.status)
        .bind(membership.joined_at)
        .bind(membership.invited_by)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::AlreadyMember(format!(
                    "user {} is already a member of organization {}",
                    membership.user_id, membership.organization_id
                ))
            } else {
                db_error("insert membership")(e)
            }
        })?;

        tracing::info!(
            membership_id = created.id,
            user_id = created.user_id,
            organization_id = created.organization_id,
            "Membership created"
        );
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "select"))]
    async fn find_membership(&self, id: i64) -> AppResult<Option<Membership>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find membership"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "select"))]
    async fn find_user_membership(
        &self,
        user_id: i64,
        organization_id: i64,
    ) -> AppResult<Option<Membership>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = $1 AND organization_id = $2"
        ))
        .bind(user_id)
        .bind(organization_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find user membership"))
    }

    #[tracing::instrument(skip(self, patch), fields(db.table = "memberships", db.operation = "update"))]
    async fn update_membership(
        &self,
        id: i64,
        patch: &MembershipPatch,
    ) -> AppResult<Option<Membership>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Membership>(&format!(
            r#"
            UPDATE memberships
            SET team_id = CASE WHEN $2 THEN $3 ELSE team_id END,
                role_id = COALESCE($4, role_id),
                joined_at = CASE
                    WHEN $5::membership_status = 'active' AND joined_at IS NULL THEN NOW()
                    ELSE joined_at
                END,
                status = COALESCE($5, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.team_id.is_some())
        .bind(patch.team_id.flatten())
        .bind(patch.role_id)
        .bind(patch.status)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("update membership"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "delete"))]
    async fn delete_membership(&self, id: i64) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM memberships WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(db_error("delete membership"))?;

        if result.rows_affected() > 0 {
            tracing::info!(membership_id = id, "Membership removed");
        }
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "select"))]
    async fn list_memberships(
        &self,
        organization_id: i64,
        pagination: Pagination,
    ) -> AppResult<Page<Membership>> {
        let p = pagination.normalized();
        let mut conn = self.conn().await?;
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM memberships WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(db_error("count memberships"))?;

        let items = sqlx::query_as::<Postgres, Membership>(&format!(
            r#"
            SELECT {MEMBERSHIP_COLUMNS} FROM memberships
            WHERE organization_id = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(organization_id)
        .bind(p.limit)
        .bind(p.offset)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("list memberships"))?;

        Ok(Page::new(items, total, p))
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "select"))]
    async fn list_team_memberships(&self, team_id: i64) -> AppResult<Vec<Membership>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE team_id = $1 ORDER BY id"
        ))
        .bind(team_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("list team memberships"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "select"))]
    async fn user_memberships(&self, user_id: i64) -> AppResult<Vec<Membership>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("user memberships"))
    }
}
