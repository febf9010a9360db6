use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};
use sqlx::Postgres;

use super::{db_error, is_unique_violation, PgAuthzStore};
use crate::store::OrganizationStore;

const ORGANIZATION_COLUMNS: &str = "id, name, display_name, description, status, settings, created_at, updated_at, deleted_at";

#[async_trait]
impl OrganizationStore for PgAuthzStore {
    #[tracing::instrument(skip(self, org), fields(db.table = "organizations", db.operation = "insert"))]
    async fn insert_organization(&self, org: &NewOrganization) -> AppResult<Organization> {
        let mut conn = self.conn().await?;
        let created = sqlx::query_as::<Postgres, Organization>(&format!(
            r#"
            INSERT INTO organizations (name, display_name, description, settings)
            VALUES ($1, $2, $3, COALESCE($4, '{{}}'::jsonb))
            RETURNING {ORGANIZATION_COLUMNS}
            "#
        ))
        .bind(&org.name)
        .bind(&org.display_name)
        .bind(&org.description)
        .bind(&org.settings)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateName(format!("organization '{}' already exists", org.name))
            } else {
                db_error("insert organization")(e)
            }
        })?;

        tracing::info!(organization_id = created.id, name = %created.name, "Organization created");
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "select"))]
    async fn find_organization(&self, id: i64) -> AppResult<Option<Organization>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Organization>(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find organization"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "select"))]
    async fn find_organization_by_name(&self, name: &str) -> AppResult<Option<Organization>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Organization>(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find organization by name"))
    }

    #[tracing::instrument(skip(self, patch), fields(db.table = "organizations", db.operation = "update"))]
    async fn update_organization(
        &self,
        id: i64,
        patch: &OrganizationPatch,
    ) -> AppResult<Option<Organization>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Organization>(&format!(
            r#"
            UPDATE organizations
            SET display_name = COALESCE($2, display_name),
                description = COALESCE($3, description),
                status = COALESCE($4, status),
                settings = COALESCE($5, settings),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ORGANIZATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.display_name)
        .bind(&patch.description)
        .bind(patch.status)
        .bind(&patch.settings)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("update organization"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "update"))]
    async fn soft_delete_organization(&self, id: i64, at: DateTime<Utc>) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(
            r#"
            UPDATE organizations
            SET deleted_at = $2, updated_at = $2
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&mut *conn)
        .await
        .map_err(db_error("soft delete organization"))?;

        if result.rows_affected() > 0 {
            tracing::info!(organization_id = id, "Organization soft-deleted");
        }
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "select"))]
    async fn list_organizations(&self, pagination: Pagination) -> AppResult<Page<Organization>> {
        let p = pagination.normalized();
        let mut conn = self.conn().await?;
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM organizations WHERE deleted_at IS NULL")
                .fetch_one(&mut *conn)
                .await
                .map_err(db_error("count organizations"))?;

        let items = sqlx::query_as::<Postgres, Organization>(&format!(
            r#"
            SELECT {ORGANIZATION_COLUMNS} FROM organizations
            WHERE deleted_at IS NULL
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(p.limit)
        .bind(p.offset)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("list organizations"))?;

        Ok(Page::new(items, total, p))
    }

    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "select"))]
    async fn organizations_for_user(&self, user_id: i64) -> AppResult<Vec<Organization>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Organization>(
            r#"
            SELECT o.id, o.name, o.display_name, o.description, o.status, o.settings,
                   o.created_at, o.updated_at, o.deleted_at
            FROM organizations o
            JOIN memberships m ON m.organization_id = o.id
            WHERE m.user_id = $1 AND m.status = 'active' AND o.deleted_at IS NULL
            ORDER BY o.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("organizations for user"))
    }
}
