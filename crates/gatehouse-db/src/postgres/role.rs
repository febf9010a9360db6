use async_trait::async_trait;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};
use sqlx::Postgres;

use super::{db_error, is_unique_violation, PgAuthzStore};
use crate::store::RoleStore;

const ROLE_COLUMNS: &str = "id, name, display_name, description, organization_id, level, is_system, is_default, status, created_at, updated_at";

const ROLE_FILTER: &str = r#"
    ($1::BIGINT IS NULL OR organization_id = $1 OR organization_id IS NULL)
    AND ($2::TEXT IS NULL OR name ILIKE '%' || $2 || '%' OR display_name ILIKE '%' || $2 || '%')
    AND ($3::entity_status IS NULL OR status = $3)
    AND ($4::BOOLEAN IS NULL OR is_system = $4)
    AND ($5::INTEGER IS NULL OR level >= $5)
"#;

fn duplicate_role(name: &str) -> AppError {
    AppError::DuplicateName(format!("role '{name}' already exists"))
}

#[async_trait]
impl RoleStore for PgAuthzStore {
    #[tracing::instrument(skip(self, role), fields(db.table = "roles", db.operation = "insert"))]
    async fn insert_role(&self, role: &NewRole, is_system: bool) -> AppResult<Role> {
        let mut conn = self.conn().await?;
        let created = sqlx::query_as::<Postgres, Role>(&format!(
            r#"
            INSERT INTO roles (name, display_name, description, organization_id, level, is_system, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(&role.name)
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(role.organization_id)
        .bind(role.level)
        .bind(is_system)
        .bind(role.is_default)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_role(&role.name)
            } else {
                db_error("insert role")(e)
            }
        })?;

        tracing::info!(role_id = created.id, name = %created.name, "Role created");
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "roles", db.operation = "select"))]
    async fn find_role(&self, id: i64) -> AppResult<Option<Role>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Role>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error("find role"))
    }

    #[tracing::instrument(skip(self, ids), fields(db.table = "roles", db.operation = "select"))]
    async fn find_roles(&self, ids: &[i64]) -> AppResult<Vec<Role>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("find roles"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "roles", db.operation = "select"))]
    async fn find_role_by_name(
        &self,
        name: &str,
        organization_id: Option<i64>,
    ) -> AppResult<Option<Role>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Role>(&format!(
            r#"
            SELECT {ROLE_COLUMNS} FROM roles
            WHERE name = $1 AND organization_id IS NOT DISTINCT FROM $2
            "#
        ))
        .bind(name)
        .bind(organization_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find role by name"))
    }

    #[tracing::instrument(skip(self, patch), fields(db.table = "roles", db.operation = "update"))]
    async fn update_role(&self, id: i64, patch: &RolePatch) -> AppResult<Option<Role>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Role>(&format!(
            r#"
            UPDATE roles
            SET name = COALESCE($2, name),
                display_name = COALESCE($3, display_name),
                description = COALESCE($4, description),
                level = COALESCE($5, level),
                is_default = COALESCE($6, is_default),
                status = COALESCE($7, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.display_name)
        .bind(&patch.description)
        .bind(patch.level)
        .bind(patch.is_default)
        .bind(patch.status)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                duplicate_role(patch.name.as_deref().unwrap_or_default())
            } else {
                db_error("update role")(e)
            }
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "roles", db.operation = "delete"))]
    async fn delete_role(&self, id: i64) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(db_error("delete role"))?;

        if result.rows_affected() > 0 {
            tracing::info!(role_id = id, "Role deleted");
        }
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, query), fields(db.table = "roles", db.operation = "select"))]
    async fn list_roles(&self, query: &RoleQuery, pagination: Pagination) -> AppResult<Page<Role>> {
        let p = pagination.normalized();
        let mut conn = self.conn().await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM roles WHERE {ROLE_FILTER}"))
            .bind(query.organization_id)
            .bind(&query.search)
            .bind(query.status)
            .bind(query.is_system)
            .bind(query.min_level)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_error("count roles"))?;

        let items = sqlx::query_as::<Postgres, Role>(&format!(
            r#"
            SELECT {ROLE_COLUMNS} FROM roles
            WHERE {ROLE_FILTER}
            ORDER BY level DESC, name
            LIMIT $6 OFFSET $7
            "#
        ))
        .bind(query.organization_id)
        .bind(&query.search)
        .bind(query.status)
        .bind(query.is_system)
        .bind(query.min_level)
        .bind(p.limit)
        .bind(p.offset)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("list roles"))?;

        Ok(Page::new(items, total, p))
    }

    #[tracing::instrument(skip(self), fields(db.table = "roles", db.operation = "select"))]
    async fn find_default_role(&self, organization_id: Option<i64>) -> AppResult<Option<Role>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Role>(&format!(
            r#"
            SELECT {ROLE_COLUMNS} FROM roles
            WHERE is_default = TRUE AND status = 'active'
              AND organization_id IS NOT DISTINCT FROM $1
            ORDER BY id
            LIMIT 1
            "#
        ))
        .bind(organization_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find default role"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "roles", db.operation = "select"))]
    async fn count_default_roles(&self, organization_id: Option<i64>) -> AppResult<i64> {
        let mut conn = self.conn().await?;
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM roles WHERE is_default = TRUE AND status = 'active' AND organization_id IS NOT DISTINCT FROM $1",
        )
        .bind(organization_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error("count default roles"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "roles", db.operation = "select"))]
    async fn role_usage(&self, role_id: i64) -> AppResult<i64> {
        let mut conn = self.conn().await?;
        sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM memberships WHERE role_id = $1)
                 + (SELECT COUNT(*) FROM user_roles WHERE role_id = $1)
                 + (SELECT COUNT(*) FROM organization_roles WHERE role_id = $1)
                 + (SELECT COUNT(*) FROM team_roles WHERE role_id = $1)
                 + (SELECT COUNT(*) FROM invitations WHERE role_id = $1 AND status = 'pending')
            "#,
        )
        .bind(role_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error("role usage"))
    }
}
