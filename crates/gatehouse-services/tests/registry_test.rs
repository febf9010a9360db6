#[path = "helpers/mod.rs"]
mod helpers;

use gatehouse_core::catalog;
use gatehouse_core::models::*;
use gatehouse_core::AppError;
use helpers::{create_organization, create_role_with, new_role, setup_bare_app, setup_test_app, system_role};

fn new_permission(name: &str) -> NewPermission {
    let (resource, action) = name.split_once('.').unwrap();
    NewPermission {
        name: name.to_string(),
        display_name: name.to_string(),
        description: None,
        resource: resource.to_string(),
        action: action.to_string(),
        category: "content".to_string(),
    }
}

#[tokio::test]
async fn test_seeding_is_idempotent() {
    let app = setup_test_app().await;
    let first = app
        .registry()
        .list_permissions(PermissionQuery::default(), Pagination::default())
        .await
        .unwrap()
        .total;

    app.registry().initialize_system_catalog().await.unwrap();
    assert_eq!(app.registry().initialize_system_permissions().await.unwrap(), 0);
    assert_eq!(app.registry().initialize_system_roles().await.unwrap(), 0);
    assert_eq!(app.registry().initialize_role_templates().await.unwrap(), 0);

    let second = app
        .registry()
        .list_permissions(PermissionQuery::default(), Pagination::default())
        .await
        .unwrap()
        .total;
    assert_eq!(first, second);
    assert_eq!(first as usize, catalog::system_permissions().len());
}

#[tokio::test]
async fn test_seeded_roles_carry_their_grants() {
    let app = setup_test_app().await;

    let super_admin = system_role(&app, catalog::SUPER_ADMIN).await;
    assert!(super_admin.is_system);
    let with_permissions = app.registry().role_with_permissions(super_admin.id).await.unwrap();
    assert_eq!(with_permissions.permissions.len(), 1);
    assert!(with_permissions.permissions[0].is_wildcard());

    let member = app.registry().get_role_by_name("member", None).await.unwrap();
    assert!(member.is_default);
    assert!(!member.is_system);
    let names: Vec<String> = app
        .registry()
        .role_with_permissions(member.id)
        .await
        .unwrap()
        .permissions
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert!(names.contains(&"members.read".to_string()));
}

#[tokio::test]
async fn test_create_role_rejects_duplicate_name_in_scope() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let other = create_organization(&app, "globex", 1).await;

    app.registry()
        .create_role(new_role("editor", Some(org.id), 200))
        .await
        .unwrap();

    let err = app
        .registry()
        .create_role(new_role("editor", Some(org.id), 300))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateName(_)));

    // Same name in another organization and as a template is fine.
    app.registry()
        .create_role(new_role("editor", Some(other.id), 200))
        .await
        .unwrap();
    app.registry()
        .create_role(new_role("editor", None, 200))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_role_in_missing_organization() {
    let app = setup_test_app().await;
    let err = app
        .registry()
        .create_role(new_role("editor", Some(999), 200))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OrganizationNotFound(_)));
}

#[tokio::test]
async fn test_system_roles_are_immutable() {
    let app = setup_test_app().await;
    let admin = system_role(&app, catalog::ADMIN).await;
    let before = app.registry().role_with_permissions(admin.id).await.unwrap();

    let update = app
        .registry()
        .update_role(
            admin.id,
            RolePatch {
                level: Some(1),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(update, Err(AppError::Immutable(_))));

    let delete = app.registry().delete_role(admin.id).await;
    assert!(matches!(delete, Err(AppError::Immutable(_))));

    let assign = app
        .registry()
        .assign_permissions_to_role(admin.id, &[], None)
        .await;
    assert!(matches!(assign, Err(AppError::Immutable(_))));

    let after = app.registry().role_with_permissions(admin.id).await.unwrap();
    assert_eq!(before.role.level, after.role.level);
    assert_eq!(before.permissions.len(), after.permissions.len());
}

#[tokio::test]
async fn test_update_role_is_partial() {
    let app = setup_test_app().await;
    let role = app
        .registry()
        .create_role(NewRole {
            description: Some("edits things".to_string()),
            ..new_role("editor", None, 200)
        })
        .await
        .unwrap();

    let updated = app
        .registry()
        .update_role(
            role.id,
            RolePatch {
                level: Some(250),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.level, 250);
    assert_eq!(updated.name, "editor");
    assert_eq!(updated.description.as_deref(), Some("edits things"));
}

#[tokio::test]
async fn test_delete_role_in_use() {
    let app = setup_test_app().await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;
    app.bindings()
        .bind(helpers::bind_request(7, role.id, BindingScope::Global))
        .await
        .unwrap();

    let err = app.registry().delete_role(role.id).await.unwrap_err();
    assert!(matches!(err, AppError::InUse(_)));

    app.bindings()
        .unbind(7, role.id, BindingScope::Global)
        .await
        .unwrap();
    app.registry().delete_role(role.id).await.unwrap();
    assert!(matches!(
        app.registry().get_role(role.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_default_role_cannot_be_deleted_or_undefaulted() {
    let app = setup_test_app().await;
    let member = app.registry().get_role_by_name("member", None).await.unwrap();

    let err = app.registry().delete_role(member.id).await.unwrap_err();
    assert!(matches!(err, AppError::InUse(_)));

    let err = app
        .registry()
        .update_role(
            member.id,
            RolePatch {
                is_default: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InUse(_)));
}

#[tokio::test]
async fn test_last_active_default_role_cannot_be_disabled() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let disable = || RolePatch {
        status: Some(EntityStatus::Disabled),
        ..Default::default()
    };
    let newcomer = app
        .registry()
        .create_role(NewRole {
            is_default: true,
            ..new_role("newcomer", Some(org.id), 50)
        })
        .await
        .unwrap();

    let err = app.registry().update_role(newcomer.id, disable()).await.unwrap_err();
    assert!(matches!(err, AppError::InUse(_)));

    let trainee = app
        .registry()
        .create_role(NewRole {
            is_default: true,
            ..new_role("trainee", Some(org.id), 40)
        })
        .await
        .unwrap();
    let disabled = app.registry().update_role(newcomer.id, disable()).await.unwrap();
    assert_eq!(disabled.status, EntityStatus::Disabled);

    // The disabled default no longer counts towards the scope's defaults.
    let err = app.registry().update_role(trainee.id, disable()).await.unwrap_err();
    assert!(matches!(err, AppError::InUse(_)));

    let membership = app
        .memberships()
        .add_member(AddMemberRequest {
            user_id: 5,
            organization_id: org.id,
            team_id: None,
            role_id: None,
            invited_by: None,
        })
        .await
        .unwrap();
    assert_eq!(membership.role_id, trainee.id);
}

#[tokio::test]
async fn test_assign_permissions_replaces_set() {
    let app = setup_test_app().await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read", "teams.update"]).await;

    let users_read = app
        .registry()
        .list_permissions(
            PermissionQuery {
                resource: Some("users".to_string()),
                action: Some("read".to_string()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap()
        .items
        .remove(0);

    // Duplicates in the request collapse to one link.
    let permissions = app
        .registry()
        .assign_permissions_to_role(role.id, &[users_read.id, users_read.id], Some(1))
        .await
        .unwrap();
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].name, "users.read");

    let cleared = app
        .registry()
        .assign_permissions_to_role(role.id, &[], None)
        .await
        .unwrap();
    assert!(cleared.is_empty());
}

#[tokio::test]
async fn test_assign_unknown_permission_leaves_set_untouched() {
    let app = setup_test_app().await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;
    let existing = app.registry().role_with_permissions(role.id).await.unwrap();

    let err = app
        .registry()
        .assign_permissions_to_role(role.id, &[existing.permissions[0].id, 424242], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let after = app.registry().role_with_permissions(role.id).await.unwrap();
    assert_eq!(after.permissions.len(), 1);
    assert_eq!(after.permissions[0].name, "teams.read");

    let err = app
        .registry()
        .assign_permissions_to_role(424242, &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_remove_permissions_is_idempotent() {
    let app = setup_test_app().await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read", "teams.update"]).await;
    let ids: Vec<i64> = app
        .registry()
        .role_with_permissions(role.id)
        .await
        .unwrap()
        .permissions
        .iter()
        .filter(|p| p.name == "teams.update")
        .map(|p| p.id)
        .collect();

    assert_eq!(app.registry().remove_permissions_from_role(role.id, &ids).await.unwrap(), 1);
    assert_eq!(app.registry().remove_permissions_from_role(role.id, &ids).await.unwrap(), 0);
    let remaining = app.registry().role_with_permissions(role.id).await.unwrap();
    assert_eq!(remaining.permissions.len(), 1);
}

#[tokio::test]
async fn test_create_permission_validation() {
    let app = setup_test_app().await;

    let created = app
        .registry()
        .create_permission(new_permission("reports.export"))
        .await
        .unwrap();
    assert!(!created.is_system);

    let duplicate = app
        .registry()
        .create_permission(new_permission("reports.export"))
        .await;
    assert!(matches!(duplicate, Err(AppError::DuplicateName(_))));

    let bad = app
        .registry()
        .create_permission(NewPermission {
            name: "Reports".to_string(),
            ..new_permission("reports.export")
        })
        .await;
    assert!(matches!(bad, Err(AppError::InvalidInput(_))));

    let wildcard = app
        .registry()
        .create_permission(NewPermission {
            name: "*".to_string(),
            ..new_permission("reports.export")
        })
        .await;
    assert!(matches!(wildcard, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn test_permission_lifecycle() {
    let app = setup_test_app().await;
    let permission = app
        .registry()
        .create_permission(new_permission("reports.export"))
        .await
        .unwrap();
    let role = create_role_with(&app, "analyst", None, 150, &["reports.export"]).await;

    let updated = app
        .registry()
        .update_permission(
            permission.id,
            PermissionPatch {
                display_name: Some("Export reports".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.display_name, "Export reports");
    assert_eq!(updated.category, "content");

    let in_use = app.registry().delete_permission(permission.id).await;
    assert!(matches!(in_use, Err(AppError::InUse(_))));

    app.registry()
        .assign_permissions_to_role(role.id, &[], None)
        .await
        .unwrap();
    app.registry().delete_permission(permission.id).await.unwrap();
    assert!(matches!(
        app.registry().get_permission(permission.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_system_permissions_are_immutable() {
    let app = setup_test_app().await;
    let all = app.registry().permissions_by_category().await.unwrap();
    let wildcard = all["system"].iter().find(|p| p.is_wildcard()).unwrap().clone();

    assert!(matches!(
        app.registry().delete_permission(wildcard.id).await,
        Err(AppError::Immutable(_))
    ));
    assert!(matches!(
        app.registry()
            .update_permission(wildcard.id, PermissionPatch::default())
            .await,
        Err(AppError::Immutable(_))
    ));
}

#[tokio::test]
async fn test_permissions_grouped_by_category() {
    let app = setup_test_app().await;
    let groups = app.registry().permissions_by_category().await.unwrap();
    assert!(groups.contains_key("access_control"));
    assert!(groups.contains_key("organization_management"));
    for group in groups.values() {
        let mut names: Vec<&str> = group.iter().map(|p| p.name.as_str()).collect();
        let sorted = {
            let mut s = names.clone();
            s.sort();
            s
        };
        assert_eq!(names, sorted);
        names.dedup();
        assert_eq!(names.len(), group.len());
    }
}

#[tokio::test]
async fn test_list_roles_filters() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let other = create_organization(&app, "globex", 1).await;
    app.registry()
        .create_role(new_role("editor", Some(org.id), 200))
        .await
        .unwrap();
    app.registry()
        .create_role(new_role("auditor", Some(other.id), 200))
        .await
        .unwrap();

    let usable = app
        .registry()
        .list_roles(
            RoleQuery {
                organization_id: Some(org.id),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert!(usable.items.iter().any(|r| r.name == "editor"));
    assert!(usable.items.iter().any(|r| r.name == "member"));
    assert!(!usable.items.iter().any(|r| r.name == "auditor"));

    let system = app
        .registry()
        .list_roles(
            RoleQuery {
                is_system: Some(true),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(system.total as usize, catalog::SYSTEM_ROLES.len());

    let senior = app
        .registry()
        .list_roles(
            RoleQuery {
                min_level: Some(900),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert!(senior.items.iter().all(|r| r.level >= 900));
}

#[tokio::test]
async fn test_get_role_by_name_prefers_organization_role() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let local = app
        .registry()
        .create_role(new_role("member", Some(org.id), 150))
        .await
        .unwrap();

    let found = app
        .registry()
        .get_role_by_name("member", Some(org.id))
        .await
        .unwrap();
    assert_eq!(found.id, local.id);

    let template = app.registry().get_role_by_name("member", None).await.unwrap();
    assert_ne!(template.id, local.id);
}

#[tokio::test]
async fn test_import_legacy_permission_map() {
    let app = setup_test_app().await;
    let role = app
        .registry()
        .create_role(new_role("editor", None, 200))
        .await
        .unwrap();

    let permissions = app
        .registry()
        .import_legacy_permission_map(
            role.id,
            r#"{"teams.read": true, "teams.update": true, "teams.delete": false}"#,
            None,
        )
        .await
        .unwrap();
    let names: Vec<&str> = permissions.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"teams.read") && names.contains(&"teams.update"));

    let err = app
        .registry()
        .import_legacy_permission_map(role.id, "{not json", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidPermissionFormat(_)));
    assert_eq!(
        app.registry().role_with_permissions(role.id).await.unwrap().permissions.len(),
        2
    );
}

#[tokio::test]
async fn test_legacy_wildcard_creates_sentinel_on_bare_store() {
    let app = setup_bare_app();
    let role = app
        .registry()
        .create_role(new_role("root", None, 1000))
        .await
        .unwrap();

    let permissions = app
        .registry()
        .import_legacy_permission_map(role.id, r#"{"*": true}"#, None)
        .await
        .unwrap();
    assert_eq!(permissions.len(), 1);
    assert!(permissions[0].is_wildcard());
    assert!(permissions[0].is_system);
}
