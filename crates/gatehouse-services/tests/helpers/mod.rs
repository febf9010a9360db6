#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use gatehouse_core::models::*;
use gatehouse_core::{FixedClock, GatehouseConfig};
use gatehouse_db::MemoryAuthzStore;
use gatehouse_services::Gatehouse;

/// Services over a fresh in-memory store with a clock that only moves when
/// told to.
pub struct TestApp {
    pub gatehouse: Gatehouse,
    pub store: MemoryAuthzStore,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    pub fn registry(&self) -> &gatehouse_services::RoleRegistry {
        &self.gatehouse.registry
    }

    pub fn bindings(&self) -> &gatehouse_services::BindingManager {
        &self.gatehouse.bindings
    }

    pub fn resolver(&self) -> &gatehouse_services::PermissionResolver {
        &self.gatehouse.resolver
    }

    pub fn memberships(&self) -> &gatehouse_services::MembershipService {
        &self.gatehouse.memberships
    }

    pub fn invitations(&self) -> &gatehouse_services::InvitationService {
        &self.gatehouse.invitations
    }
}

/// Setup services with the system catalog seeded.
pub async fn setup_test_app() -> TestApp {
    let app = setup_bare_app();
    app.gatehouse
        .bootstrap()
        .await
        .expect("Failed to seed system catalog");
    app
}

/// Setup services over an empty store.
pub fn setup_bare_app() -> TestApp {
    let store = MemoryAuthzStore::new();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
    ));
    let gatehouse = Gatehouse::with_parts(
        Arc::new(store.clone()),
        GatehouseConfig::default(),
        clock.clone(),
        Arc::new(gatehouse_services::NoOpInvitationNotifier),
    );
    TestApp {
        gatehouse,
        store,
        clock,
    }
}

pub async fn create_organization(app: &TestApp, name: &str, creator_id: i64) -> Organization {
    let (organization, _) = app
        .memberships()
        .create_organization(
            NewOrganization {
                name: name.to_string(),
                display_name: name.to_uppercase(),
                description: None,
                settings: None,
            },
            creator_id,
        )
        .await
        .expect("Failed to create organization");
    organization
}

pub async fn create_team(
    app: &TestApp,
    organization_id: i64,
    name: &str,
    parent_id: Option<i64>,
) -> Team {
    app.memberships()
        .create_team(NewTeam {
            organization_id,
            parent_id,
            name: name.to_string(),
            display_name: name.to_string(),
            description: None,
        })
        .await
        .expect("Failed to create team")
}

pub fn new_role(name: &str, organization_id: Option<i64>, level: i32) -> NewRole {
    NewRole {
        name: name.to_string(),
        display_name: name.to_string(),
        description: None,
        organization_id,
        level,
        is_default: false,
    }
}

/// Create a role linked to the named (already existing) permissions.
pub async fn create_role_with(
    app: &TestApp,
    name: &str,
    organization_id: Option<i64>,
    level: i32,
    permissions: &[&str],
) -> Role {
    let role = app
        .registry()
        .create_role(new_role(name, organization_id, level))
        .await
        .expect("Failed to create role");
    let mut ids = Vec::new();
    for permission in permissions {
        let found = app
            .registry()
            .list_permissions(
                PermissionQuery {
                    search: Some(permission.to_string()),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap()
            .items
            .into_iter()
            .find(|p| p.name == *permission)
            .unwrap_or_else(|| panic!("permission {permission} not seeded"));
        ids.push(found.id);
    }
    app.registry()
        .assign_permissions_to_role(role.id, &ids, None)
        .await
        .expect("Failed to assign permissions");
    role
}

pub async fn system_role(app: &TestApp, name: &str) -> Role {
    app.registry()
        .get_role_by_name(name, None)
        .await
        .expect("system role missing")
}

pub fn bind_request(user_id: i64, role_id: i64, scope: BindingScope) -> BindRequest {
    BindRequest {
        user_id,
        role_id,
        scope,
        assigned_by: None,
        expires_at: None,
    }
}
