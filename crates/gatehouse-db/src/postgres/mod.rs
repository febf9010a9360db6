//! PostgreSQL store
//!
//! Every query is written once against a `PgConnection`; [`PgConn`] hands out
//! either a pooled connection or the connection of the open transaction.

mod binding;
mod invitation;
mod membership;
mod organization;
mod permission;
mod role;
mod team;

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_core::{AppError, AppResult, GatehouseConfig};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tokio::sync::{Mutex, MutexGuard};

use crate::store::{AuthzStore, AuthzTransaction};

pub struct PgAuthzStore {
    pool: PgPool,
    tx: Option<Mutex<Transaction<'static, Postgres>>>,
}

pub(crate) enum PgConn<'a> {
    Pooled(PoolConnection<Postgres>),
    Tx(MutexGuard<'a, Transaction<'static, Postgres>>),
}

impl Deref for PgConn<'_> {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            PgConn::Pooled(conn) => &**conn,
            PgConn::Tx(tx) => &***tx,
        }
    }
}

impl DerefMut for PgConn<'_> {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match self {
            PgConn::Pooled(conn) => &mut **conn,
            PgConn::Tx(tx) => &mut ***tx,
        }
    }
}

impl PgAuthzStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    /// Open a pool from `DATABASE_URL` settings.
    pub async fn connect(config: &GatehouseConfig) -> AppResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| AppError::InvalidInput("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
            .connect(url)
            .await
            .map_err(db_error("connect"))?;

        tracing::info!(
            max_connections = config.db_max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                AppError::from(anyhow::Error::new(e).context("failed to run migrations"))
            })?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) async fn conn(&self) -> AppResult<PgConn<'_>> {
        match &self.tx {
            Some(tx) => Ok(PgConn::Tx(tx.lock().await)),
            None => self
                .pool
                .acquire()
                .await
                .map(PgConn::Pooled)
                .map_err(db_error("acquire connection")),
        }
    }
}

/// Log and wrap a driver error.
pub(crate) fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        tracing::error!(error = %e, operation, "Database operation failed");
        AppError::Database(e)
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl AuthzStore for PgAuthzStore {
    async fn begin(&self) -> AppResult<Box<dyn AuthzTransaction>> {
        if self.tx.is_some() {
            return Err(AppError::Internal(
                "nested transactions are not supported".to_string(),
            ));
        }
        let tx = self.pool.begin().await.map_err(db_error("begin"))?;
        Ok(Box::new(PgAuthzStore {
            pool: self.pool.clone(),
            tx: Some(Mutex::new(tx)),
        }))
    }
}

#[async_trait]
impl AuthzTransaction for PgAuthzStore {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let tx = self
            .tx
            .ok_or_else(|| AppError::Internal("not inside a transaction".to_string()))?;
        tx.into_inner().commit().await.map_err(db_error("commit"))
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let tx = self
            .tx
            .ok_or_else(|| AppError::Internal("not inside a transaction".to_string()))?;
        tx.into_inner().rollback().await.map_err(db_error("rollback"))
    }
}
