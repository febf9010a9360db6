//! Gatehouse services
//!
//! The authorization core: role and permission registry, role bindings,
//! permission resolution and the organization membership workflow. Every
//! service takes its storage handle at construction; [`Gatehouse`] wires them
//! together over one store.

pub mod bindings;
pub mod hooks;
pub mod invitation;
pub mod membership;
pub mod registry;
pub mod resolver;
mod support;

use std::sync::Arc;

use gatehouse_core::{AppResult, Clock, GatehouseConfig, SystemClock};
use gatehouse_db::AuthzStore;

pub use bindings::BindingManager;
pub use hooks::{InvitationNotifier, NoOpInvitationNotifier};
pub use invitation::InvitationService;
pub use membership::MembershipService;
pub use registry::RoleRegistry;
pub use resolver::PermissionResolver;

/// All services over one store, clock and configuration.
#[derive(Clone)]
pub struct Gatehouse {
    pub registry: RoleRegistry,
    pub bindings: BindingManager,
    pub resolver: PermissionResolver,
    pub memberships: MembershipService,
    pub invitations: InvitationService,
    config: GatehouseConfig,
}

impl Gatehouse {
    pub fn new(store: Arc<dyn AuthzStore>, config: GatehouseConfig) -> Self {
        Self::with_parts(
            store,
            config,
            Arc::new(SystemClock),
            Arc::new(NoOpInvitationNotifier),
        )
    }

    pub fn with_parts(
        store: Arc<dyn AuthzStore>,
        config: GatehouseConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn InvitationNotifier>,
    ) -> Self {
        Self {
            registry: RoleRegistry::new(store.clone()),
            bindings: BindingManager::new(store.clone(), clock.clone()),
            resolver: PermissionResolver::new(
                store.clone(),
                clock.clone(),
                config.super_admin_role.clone(),
            ),
            memberships: MembershipService::new(store.clone(), clock.clone()),
            invitations: InvitationService::new(store, clock, notifier, &config),
            config,
        }
    }

    pub fn config(&self) -> &GatehouseConfig {
        &self.config
    }

    /// Seed the built-in catalog when configured to. Safe to run on every
    /// start.
    pub async fn bootstrap(&self) -> AppResult<()> {
        if self.config.seed_system_catalog {
            self.registry.initialize_system_catalog().await?;
            tracing::info!("System catalog ready");
        } else {
            tracing::debug!("System catalog seeding disabled");
        }
        Ok(())
    }
}
