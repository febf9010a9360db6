use std::collections::HashMap;

use async_trait::async_trait;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};
use sqlx::Postgres;

use super::{db_error, is_unique_violation, PgAuthzStore};
use crate::store::PermissionStore;

const PERMISSION_COLUMNS: &str = "id, name, display_name, description, resource, action, category, is_system, status, created_at, updated_at";

const PERMISSION_FILTER: &str = r#"
    ($1::TEXT IS NULL OR name ILIKE '%' || $1 || '%' OR display_name ILIKE '%' || $1 || '%')
    AND ($2::TEXT IS NULL OR resource = $2)
    AND ($3::TEXT IS NULL OR action = $3)
    AND ($4::TEXT IS NULL OR category = $4)
    AND ($5::entity_status IS NULL OR status = $5)
"#;

#[async_trait]
impl PermissionStore for PgAuthzStore {
    #[tracing::instrument(skip(self, permission), fields(db.table = "permissions", db.operation = "insert"))]
    async fn insert_permission(
        &self,
        permission: &NewPermission,
        is_system: bool,
    ) -> AppResult<Permission> {
        let mut conn = self.conn().await?;
        let created = sqlx::query_as::<Postgres, Permission>(&format!(
            r#"
            INSERT INTO permissions (name, display_name, description, resource, action, category, is_system)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PERMISSION_COLUMNS}
            "#
        ))
        .bind(&permission.name)
        .bind(&permission.display_name)
        .bind(&permission.description)
        .bind(&permission.resource)
        .bind(&permission.action)
        .bind(&permission.category)
        .bind(is_system)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateName(format!("permission '{}' already exists", permission.name))
            } else {
                db_error("insert permission")(e)
            }
        })?;

        tracing::info!(permission_id = created.id, name = %created.name, "Permission created");
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "permissions", db.operation = "select"))]
    async fn find_permission(&self, id: i64) -> AppResult<Option<Permission>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Permission>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find permission"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "permissions", db.operation = "select"))]
    async fn find_permission_by_name(&self, name: &str) -> AppResult<Option<Permission>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Permission>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("find permission by name"))
    }

    #[tracing::instrument(skip(self, ids), fields(db.table = "permissions", db.operation = "select"))]
    async fn find_permissions(&self, ids: &[i64]) -> AppResult<Vec<Permission>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Permission>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("find permissions"))
    }

    #[tracing::instrument(skip(self, patch), fields(db.table = "permissions", db.operation = "update"))]
    async fn update_permission(
        &self,
        id: i64,
        patch: &PermissionPatch,
    ) -> AppResult<Option<Permission>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Permission>(&format!(
            r#"
            UPDATE permissions
            SET display_name = COALESCE($2, display_name),
                description = COALESCE($3, description),
                resource = COALESCE($4, resource),
                action = COALESCE($5, action),
                category = COALESCE($6, category),
                status = COALESCE($7, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PERMISSION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.display_name)
        .bind(&patch.description)
        .bind(&patch.resource)
        .bind(&patch.action)
        .bind(&patch.category)
        .bind(patch.status)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("update permission"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "permissions", db.operation = "delete"))]
    async fn delete_permission(&self, id: i64) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(db_error("delete permission"))?;

        if result.rows_affected() > 0 {
            tracing::info!(permission_id = id, "Permission deleted");
        }
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, query), fields(db.table = "permissions", db.operation = "select"))]
    async fn list_permissions(
        &self,
        query: &PermissionQuery,
        pagination: Pagination,
    ) -> AppResult<Page<Permission>> {
        let p = pagination.normalized();
        let mut conn = self.conn().await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM permissions WHERE {PERMISSION_FILTER}"
        ))
        .bind(&query.search)
        .bind(&query.resource)
        .bind(&query.action)
        .bind(&query.category)
        .bind(query.status)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error("count permissions"))?;

        let items = sqlx::query_as::<Postgres, Permission>(&format!(
            r#"
            SELECT {PERMISSION_COLUMNS} FROM permissions
            WHERE {PERMISSION_FILTER}
            ORDER BY category, name
            LIMIT $6 OFFSET $7
            "#
        ))
        .bind(&query.search)
        .bind(&query.resource)
        .bind(&query.action)
        .bind(&query.category)
        .bind(query.status)
        .bind(p.limit)
        .bind(p.offset)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("list permissions"))?;

        Ok(Page::new(items, total, p))
    }

    #[tracing::instrument(skip(self), fields(db.table = "permissions", db.operation = "select"))]
    async fn all_permissions(&self) -> AppResult<Vec<Permission>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Permission>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY category, name"
        ))
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("all permissions"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "role_permissions", db.operation = "select"))]
    async fn permission_link_count(&self, permission_id: i64) -> AppResult<i64> {
        let mut conn = self.conn().await?;
        sqlx::query_scalar("SELECT COUNT(*) FROM role_permissions WHERE permission_id = $1")
            .bind(permission_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_error("permission link count"))
    }

    #[tracing::instrument(skip(self), fields(db.table = "role_permissions", db.operation = "select"))]
    async fn role_permissions(&self, role_id: i64) -> AppResult<Vec<Permission>> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<Postgres, Permission>(
            r#"
            SELECT p.id, p.name, p.display_name, p.description, p.resource, p.action,
                   p.category, p.is_system, p.status, p.created_at, p.updated_at
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(role_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("role permissions"))
    }

    #[tracing::instrument(skip(self, permission_ids), fields(db.table = "role_permissions", db.operation = "insert"))]
    async fn link_permissions(
        &self,
        role_id: i64,
        permission_ids: &[i64],
        granted_by: Option<i64>,
    ) -> AppResult<()> {
        if permission_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id, granted_by)
            SELECT $1, pid, $3 FROM UNNEST($2::BIGINT[]) AS pid
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(permission_ids)
        .bind(granted_by)
        .execute(&mut *conn)
        .await
        .map_err(db_error("link permissions"))?;

        tracing::info!(role_id, count = permission_ids.len(), "Permissions linked to role");
        Ok(())
    }

    #[tracing::instrument(skip(self, permission_ids), fields(db.table = "role_permissions", db.operation = "delete"))]
    async fn unlink_permissions(&self, role_id: i64, permission_ids: &[i64]) -> AppResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(
            "DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = ANY($2)",
        )
        .bind(role_id)
        .bind(permission_ids)
        .execute(&mut *conn)
        .await
        .map_err(db_error("unlink permissions"))?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "role_permissions", db.operation = "delete"))]
    async fn clear_role_permissions(&self, role_id: i64) -> AppResult<u64> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *conn)
            .await
            .map_err(db_error("clear role permissions"))?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, role_ids), fields(db.table = "role_permissions", db.operation = "select"))]
    async fn role_grants(&self, role_ids: &[i64]) -> AppResult<Vec<RoleGrant>> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let roles = sqlx::query_as::<Postgres, Role>(
            r#"
            SELECT id, name, display_name, description, organization_id, level,
                   is_system, is_default, status, created_at, updated_at
            FROM roles
            WHERE id = ANY($1) AND status = 'active'
            ORDER BY id
            "#,
        )
        .bind(role_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("role grants"))?;

        let links: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT rp.role_id, p.name
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = ANY($1) AND p.status = 'active'
            ORDER BY p.name
            "#,
        )
        .bind(role_ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error("role grant links"))?;

        let mut by_role: HashMap<i64, Vec<String>> = HashMap::new();
        for (role_id, name) in links {
            by_role.entry(role_id).or_default().push(name);
        }

        Ok(roles
            .into_iter()
            .map(|role| RoleGrant {
                permissions: by_role.remove(&role.id).unwrap_or_default(),
                role,
            })
            .collect())
    }
}
