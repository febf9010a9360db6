use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};
use sqlx::Postgres;

use super::{db_error, is_unique_violation, PgAuthzStore};
use crate::store::BindingStore;

/// Row shape shared by `user_roles`, `organization_roles` and `team_roles`.
#[derive(sqlx::FromRow)]
struct BindingRow {
    id: i64,
    user_id: i64,
    role_id: i64,
    scope_id: Option<i64>,
    assigned_by: Option<i64>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BindingRow {
    fn into_binding(self, kind: ScopeKind) -> AppResult<RoleBinding> {
        let scope = BindingScope::from_parts(kind, self.scope_id).ok_or_else(|| {
            AppError::Internal(format!("binding {} has no scope id", self.id))
        })?;
        Ok(RoleBinding {
            id: self.id,
            user_id: self.user_id,
            role_id: self.role_id,
            scope,
            assigned_by: self.assigned_by,
            expires_at: self.expires_at,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Table and scope column for a binding scope.
fn binding_table(kind: ScopeKind) -> (&'static str, Option<&'static str>) {
    match kind {
        ScopeKind::Global => ("user_roles", None),
        ScopeKind::Organization => ("organization_roles", Some("organization_id")),
        ScopeKind::Team => ("team_roles", Some("team_id")),
    }
}

fn select_columns(kind: ScopeKind) -> String {
    let scope = binding_table(kind).1.unwrap_or("NULL::BIGINT");
    format!(
        "id, user_id, role_id, {scope} AS scope_id, assigned_by, expires_at, is_active, created_at, updated_at"
    )
}

#[async_trait]
impl BindingStore for PgAuthzStore {
    #[tracing::instrument(skip(self, binding), fields(db.operation = "insert", scope = %binding.scope))]
    async fn insert_binding(&self, binding: &BindRequest) -> AppResult<RoleBinding> {
        let kind = binding.scope.kind();
        let (table, scope_column) = binding_table(kind);
        let sql = match scope_column {
            Some(column) => format!(
                r#"
                INSERT INTO {table} (user_id, role_id, assigned_by, expires_at, {column})
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {}
                "#,
                select_columns(kind)
            ),
            None => format!(
                r#"
                INSERT INTO {table} (user_id, role_id, assigned_by, expires_at)
                VALUES ($1, $2, $3, $4)
                RETURNING {}
                "#,
                select_columns(kind)
            ),
        };

        let mut query = sqlx::query_as::<Postgres, BindingRow>(&sql)
            .bind(binding.user_id)
            .bind(binding.role_id)
            .bind(binding.assigned_by)
            .bind(binding.expires_at);
        if let Some(scope_id) = binding.scope.scope_id() {
            query = query.bind(scope_id);
        }

        let mut conn = self.conn().await?;
        let row = query.fetch_one(&mut *conn).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::AlreadyBound(format!(
                    "user {} already holds role {} at {}",
                    binding.user_id, binding.role_id, binding.scope
                ))
            } else {
                db_error("insert binding")(e)
            }
        })?;

        let created = row.into_binding(kind)?;
        tracing::info!(
            binding_id = created.id,
            user_id = created.user_id,
            role_id = created.role_id,
            "Role bound"
        );
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.operation = "select"))]
    async fn find_binding(
        &self,
        user_id: i64,
        role_id: i64,
        scope: BindingScope,
    ) -> AppResult<Option<RoleBinding>> {
        let kind = scope.kind();
        let (table, scope_column) = binding_table(kind);
        let scope_filter = scope_column
            .map(|c| format!(" AND {c} = $3"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT {} FROM {table} WHERE user_id = $1 AND role_id = $2{scope_filter}",
            select_columns(kind)
        );

        let mut query = sqlx::query_as::<Postgres, BindingRow>(&sql)
            .bind(user_id)
            .bind(role_id);
        if let Some(scope_id) = scope.scope_id() {
            query = query.bind(scope_id);
        }

        let mut conn = self.conn().await?;
        query
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error("find binding"))?
            .map(|row| row.into_binding(kind))
            .transpose()
    }

    #[tracing::instrument(skip(self), fields(db.operation = "delete"))]
    async fn delete_binding(
        &self,
        user_id: i64,
        role_id: i64,
        scope: BindingScope,
    ) -> AppResult<bool> {
        let (table, scope_column) = binding_table(scope.kind());
        let scope_filter = scope_column
            .map(|c| format!(" AND {c} = $3"))
            .unwrap_or_default();
        let sql = format!("DELETE FROM {table} WHERE user_id = $1 AND role_id = $2{scope_filter}");

        let mut query = sqlx::query(&sql).bind(user_id).bind(role_id);
        if let Some(scope_id) = scope.scope_id() {
            query = query.bind(scope_id);
        }

        let mut conn = self.conn().await?;
        let result = query
            .execute(&mut *conn)
            .await
            .map_err(db_error("delete binding"))?;

        if result.rows_affected() > 0 {
            tracing::info!(user_id, role_id, %scope, "Role unbound");
        }
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.operation = "select"))]
    async fn user_bindings(&self, user_id: i64) -> AppResult<Vec<RoleBinding>> {
        let mut conn = self.conn().await?;
        let mut bindings = Vec::new();
        for kind in ScopeKind::ALL {
            let (table, _) = binding_table(kind);
            let sql = format!(
                "SELECT {} FROM {table} WHERE user_id = $1 ORDER BY id",
                select_columns(kind)
            );
            let rows = sqlx::query_as::<Postgres, BindingRow>(&sql)
                .bind(user_id)
                .fetch_all(&mut *conn)
                .await
                .map_err(db_error("user bindings"))?;
            for row in rows {
                bindings.push(row.into_binding(kind)?);
            }
        }
        Ok(bindings)
    }

    #[tracing::instrument(skip(self), fields(db.operation = "select"))]
    async fn role_bindings(
        &self,
        role_id: i64,
        scope: BindingScope,
    ) -> AppResult<Vec<RoleBinding>> {
        let kind = scope.kind();
        let (table, scope_column) = binding_table(kind);
        let scope_filter = scope_column
            .map(|c| format!(" AND {c} = $2"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT {} FROM {table} WHERE role_id = $1{scope_filter} ORDER BY id",
            select_columns(kind)
        );

        let mut query = sqlx::query_as::<Postgres, BindingRow>(&sql).bind(role_id);
        if let Some(scope_id) = scope.scope_id() {
            query = query.bind(scope_id);
        }

        let mut conn = self.conn().await?;
        query
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error("role bindings"))?
            .into_iter()
            .map(|row| row.into_binding(kind))
            .collect()
    }
}
