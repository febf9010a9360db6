#[path = "helpers/mod.rs"]
mod helpers;

use chrono::Duration;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, Clock};
use helpers::{
    bind_request, create_organization, create_role_with, create_team, new_role, setup_test_app,
};

#[tokio::test]
async fn test_bind_twice_is_rejected() {
    let app = setup_test_app().await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;
    let scope = BindingScope::Global;

    let first = app.bindings().bind(bind_request(5, role.id, scope)).await.unwrap();
    let err = app
        .bindings()
        .bind(bind_request(5, role.id, scope))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyBound(_)));

    let bound = app.bindings().list_bindings(5, scope).await.unwrap();
    assert_eq!(bound.len(), 1);
    assert_eq!(bound[0].binding.id, first.id);
}

#[tokio::test]
async fn test_unbind_is_idempotent() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let team = create_team(&app, org.id, "core", None).await;
    let role = create_role_with(&app, "editor", Some(org.id), 200, &["teams.read"]).await;

    for scope in [
        BindingScope::Global,
        BindingScope::Organization(org.id),
        BindingScope::Team(team.id),
    ] {
        assert!(!app.bindings().unbind(5, role.id, scope).await.unwrap());
    }

    let scope = BindingScope::Team(team.id);
    app.bindings().bind(bind_request(5, role.id, scope)).await.unwrap();
    assert!(app.bindings().unbind(5, role.id, scope).await.unwrap());
    assert!(!app.bindings().unbind(5, role.id, scope).await.unwrap());
    assert!(!app.bindings().is_bound(5, role.id, scope).await.unwrap());
}

#[tokio::test]
async fn test_expired_binding_is_hidden_and_replaceable() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;
    let scope = BindingScope::Organization(org.id);

    let expires_at = app.clock.now() + Duration::hours(1);
    app.bindings()
        .bind(BindRequest {
            expires_at: Some(expires_at),
            ..bind_request(5, role.id, scope)
        })
        .await
        .unwrap();
    assert!(app.bindings().is_bound(5, role.id, scope).await.unwrap());

    app.clock.advance(Duration::hours(1));
    assert!(!app.bindings().is_bound(5, role.id, scope).await.unwrap());
    assert!(app.bindings().list_bindings(5, scope).await.unwrap().is_empty());

    // The stale row is replaced rather than reported as a duplicate.
    let rebound = app.bindings().bind(bind_request(5, role.id, scope)).await.unwrap();
    assert!(rebound.expires_at.is_none());
    assert!(app.bindings().is_bound(5, role.id, scope).await.unwrap());
}

#[tokio::test]
async fn test_inactive_binding_is_replaceable() {
    let app = setup_test_app().await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;
    let scope = BindingScope::Global;

    let binding = app.bindings().bind(bind_request(5, role.id, scope)).await.unwrap();
    app.store.set_binding_active(binding.id, false).await.unwrap();
    assert!(!app.bindings().is_bound(5, role.id, scope).await.unwrap());

    let rebound = app.bindings().bind(bind_request(5, role.id, scope)).await.unwrap();
    assert_ne!(rebound.id, binding.id);
    assert!(rebound.is_active);
}

#[tokio::test]
async fn test_bind_rejects_past_expiry() {
    let app = setup_test_app().await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;
    let err = app
        .bindings()
        .bind(BindRequest {
            expires_at: Some(app.clock.now()),
            ..bind_request(5, role.id, BindingScope::Global)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_bind_validates_targets() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;

    let missing_role = app
        .bindings()
        .bind(bind_request(5, 999_999, BindingScope::Global))
        .await;
    assert!(matches!(missing_role, Err(AppError::NotFound(_))));

    let missing_org = app
        .bindings()
        .bind(bind_request(5, role.id, BindingScope::Organization(999_999)))
        .await;
    assert!(matches!(missing_org, Err(AppError::OrganizationNotFound(_))));

    let missing_team = app
        .bindings()
        .bind(bind_request(5, role.id, BindingScope::Team(999_999)))
        .await;
    assert!(matches!(missing_team, Err(AppError::NotFound(_))));

    app.memberships().delete_organization(org.id).await.unwrap();
    let deleted_org = app
        .bindings()
        .bind(bind_request(5, role.id, BindingScope::Organization(org.id)))
        .await;
    assert!(matches!(deleted_org, Err(AppError::OrganizationNotFound(_))));
}

#[tokio::test]
async fn test_organization_role_stays_in_its_organization() {
    let app = setup_test_app().await;
    let acme = create_organization(&app, "acme", 1).await;
    let globex = create_organization(&app, "globex", 1).await;
    let acme_team = create_team(&app, acme.id, "core", None).await;
    let globex_team = create_team(&app, globex.id, "core", None).await;
    let role = app
        .registry()
        .create_role(new_role("editor", Some(acme.id), 200))
        .await
        .unwrap();

    for scope in [
        BindingScope::Global,
        BindingScope::Organization(globex.id),
        BindingScope::Team(globex_team.id),
    ] {
        let err = app.bindings().bind(bind_request(5, role.id, scope)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)), "{scope}: {err:?}");
    }

    app.bindings()
        .bind(bind_request(5, role.id, BindingScope::Organization(acme.id)))
        .await
        .unwrap();
    app.bindings()
        .bind(bind_request(5, role.id, BindingScope::Team(acme_team.id)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_list_bindings_is_per_scope_instance() {
    let app = setup_test_app().await;
    let acme = create_organization(&app, "acme", 1).await;
    let globex = create_organization(&app, "globex", 1).await;
    let editor = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;
    let viewer = create_role_with(&app, "viewer", None, 100, &["teams.read"]).await;

    app.bindings()
        .bind(bind_request(5, editor.id, BindingScope::Organization(acme.id)))
        .await
        .unwrap();
    app.bindings()
        .bind(bind_request(5, viewer.id, BindingScope::Organization(globex.id)))
        .await
        .unwrap();
    app.bindings()
        .bind(bind_request(5, viewer.id, BindingScope::Global))
        .await
        .unwrap();

    let acme_roles = app
        .bindings()
        .list_bindings(5, BindingScope::Organization(acme.id))
        .await
        .unwrap();
    assert_eq!(acme_roles.len(), 1);
    assert_eq!(acme_roles[0].role.name, "editor");

    let global = app.bindings().list_bindings(5, BindingScope::Global).await.unwrap();
    assert_eq!(global.len(), 1);
    assert_eq!(global[0].role.id, viewer.id);
}

#[tokio::test]
async fn test_bind_many_skips_failures() {
    let app = setup_test_app().await;
    let editor = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;
    let viewer = create_role_with(&app, "viewer", None, 100, &["teams.read"]).await;
    app.bindings()
        .bind(bind_request(5, viewer.id, BindingScope::Global))
        .await
        .unwrap();

    let created = app
        .bindings()
        .bind_many(5, &[editor.id, viewer.id, 999_999], BindingScope::Global, Some(1))
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].role_id, editor.id);
    assert_eq!(created[0].assigned_by, Some(1));
}

#[tokio::test]
async fn test_users_with_role() {
    let app = setup_test_app().await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;
    for user in [9, 3, 6] {
        app.bindings()
            .bind(bind_request(user, role.id, BindingScope::Global))
            .await
            .unwrap();
    }
    app.bindings()
        .bind(BindRequest {
            expires_at: Some(app.clock.now() + Duration::minutes(5)),
            ..bind_request(12, role.id, BindingScope::Global)
        })
        .await
        .unwrap();
    app.clock.advance(Duration::minutes(10));

    let users = app
        .bindings()
        .users_with_role(role.id, BindingScope::Global)
        .await
        .unwrap();
    assert_eq!(users, vec![3, 6, 9]);
}

#[tokio::test]
async fn test_team_delete_drops_team_bindings() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let team = create_team(&app, org.id, "core", None).await;
    let role = create_role_with(&app, "editor", None, 200, &["teams.read"]).await;
    app.bindings()
        .bind(bind_request(5, role.id, BindingScope::Team(team.id)))
        .await
        .unwrap();

    app.memberships().delete_team(team.id).await.unwrap();
    assert!(!app
        .bindings()
        .is_bound(5, role.id, BindingScope::Team(team.id))
        .await
        .unwrap());
}
