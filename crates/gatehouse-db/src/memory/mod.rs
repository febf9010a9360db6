//! In-process store
//!
//! Keeps every table in one state value behind a single async mutex. A
//! transaction holds that mutex for its whole lifetime and works on a copy of
//! the state; commit swaps the copy in, drop throws it away. Other callers wait
//! for the transaction to finish, so transactions are serializable.

mod binding;
mod invitation;
mod membership;
mod organization;
mod permission;
mod role;
mod team;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, AppResult};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::{AuthzStore, AuthzTransaction};

#[derive(Debug, Default, Clone)]
pub(crate) struct MemoryState {
    next_id: i64,
    pub(crate) organizations: BTreeMap<i64, Organization>,
    pub(crate) teams: BTreeMap<i64, Team>,
    pub(crate) roles: BTreeMap<i64, Role>,
    pub(crate) permissions: BTreeMap<i64, Permission>,
    pub(crate) role_permissions: Vec<RolePermission>,
    pub(crate) memberships: BTreeMap<i64, Membership>,
    pub(crate) bindings: BTreeMap<i64, RoleBinding>,
    pub(crate) invitations: BTreeMap<i64, Invitation>,
}

impl MemoryState {
    pub(crate) fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

struct TxState {
    base: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
}

/// In-memory [`AuthzStore`], used by tests and embedded deployments.
#[derive(Clone, Default)]
pub struct MemoryAuthzStore {
    shared: Arc<Mutex<MemoryState>>,
    tx: Option<Arc<Mutex<TxState>>>,
}

impl MemoryAuthzStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn with_state<R>(
        &self,
        f: impl FnOnce(&mut MemoryState) -> AppResult<R> + Send,
    ) -> AppResult<R> {
        match &self.tx {
            Some(tx) => {
                let mut tx = tx.lock().await;
                if tx.base.is_none() {
                    return Err(AppError::Internal(
                        "transaction already finished".to_string(),
                    ));
                }
                f(&mut tx.working)
            }
            None => {
                let mut state = self.shared.lock().await;
                f(&mut state)
            }
        }
    }

    async fn finish(&self, keep: bool) -> AppResult<()> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            AppError::Internal("not inside a transaction".to_string())
        })?;
        let mut tx = tx.lock().await;
        let mut base = tx.base.take().ok_or_else(|| {
            AppError::Internal("transaction already finished".to_string())
        })?;
        if keep {
            *base = std::mem::take(&mut tx.working);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthzStore for MemoryAuthzStore {
    async fn begin(&self) -> AppResult<Box<dyn AuthzTransaction>> {
        if self.tx.is_some() {
            return Err(AppError::Internal(
                "nested transactions are not supported".to_string(),
            ));
        }
        let base = self.shared.clone().lock_owned().await;
        let working = (*base).clone();
        tracing::trace!("memory transaction started");
        Ok(Box::new(MemoryAuthzStore {
            shared: self.shared.clone(),
            tx: Some(Arc::new(Mutex::new(TxState {
                base: Some(base),
                working,
            }))),
        }))
    }
}

#[async_trait]
impl AuthzTransaction for MemoryAuthzStore {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.finish(true).await?;
        tracing::trace!("memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.finish(false).await?;
        tracing::trace!("memory transaction rolled back");
        Ok(())
    }
}
