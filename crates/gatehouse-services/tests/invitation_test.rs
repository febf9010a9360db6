#[path = "helpers/mod.rs"]
mod helpers;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use gatehouse_core::models::*;
use gatehouse_core::{AppError, Clock, GatehouseConfig};
use gatehouse_db::prelude::*;
use gatehouse_services::{Gatehouse, InvitationNotifier};
use helpers::{create_organization, create_team, setup_test_app, TestApp};

fn invite(organization_id: i64) -> InviteRequest {
    InviteRequest {
        email: "alice@example.com".to_string(),
        organization_id,
        team_id: None,
        role_id: None,
        invited_by: 1,
    }
}

#[tokio::test]
async fn test_invitation_defaults() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let created_at = app.clock.now();

    let invitation = app.invitations().invite_member(invite(org.id)).await.unwrap();
    assert_eq!(invitation.status, InvitationStatus::Pending);
    assert_eq!(invitation.expires_at, created_at + Duration::days(7));
    assert_eq!(invitation.token.len(), 43);
    assert!(!invitation.token.contains('='));

    let role = app.registry().get_role(invitation.role_id).await.unwrap();
    assert_eq!(role.name, "member");

    let by_token = app
        .invitations()
        .get_invitation_by_token(&invitation.token)
        .await
        .unwrap();
    assert_eq!(by_token.id, invitation.id);
}

#[tokio::test]
async fn test_accept_invitation_once() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let invitation = app.invitations().invite_member(invite(org.id)).await.unwrap();

    let alice = 77;
    let membership = app
        .invitations()
        .process_invitation(&invitation.token, alice)
        .await
        .unwrap();
    assert!(membership.is_active());
    assert_eq!(membership.organization_id, org.id);
    assert_eq!(membership.role_id, invitation.role_id);
    assert_eq!(membership.invited_by, Some(1));
    assert_eq!(
        app.registry().get_role(membership.role_id).await.unwrap().name,
        "member"
    );

    let stored = app.invitations().get_invitation(invitation.id).await.unwrap();
    assert_eq!(stored.status, InvitationStatus::Accepted);

    let again = app
        .invitations()
        .process_invitation(&invitation.token, alice)
        .await;
    assert!(matches!(again, Err(AppError::AlreadyProcessed(_))));
}

#[tokio::test]
async fn test_expired_invitation_is_recorded_once() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let invitation = app.invitations().invite_member(invite(org.id)).await.unwrap();

    app.clock.advance(Duration::days(7) + Duration::seconds(1));

    let first = app.invitations().process_invitation(&invitation.token, 77).await;
    assert!(matches!(first, Err(AppError::Expired(_))));
    let stored = app.invitations().get_invitation(invitation.id).await.unwrap();
    assert_eq!(stored.status, InvitationStatus::Expired);

    let second = app.invitations().process_invitation(&invitation.token, 77).await;
    assert!(matches!(second, Err(AppError::AlreadyProcessed(_))));

    assert!(matches!(
        app.memberships().get_member(org.id, 77).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_unknown_token() {
    let app = setup_test_app().await;
    let err = app
        .invitations()
        .process_invitation("no-such-token", 77)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_existing_member_keeps_invitation_pending() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let invitation = app.invitations().invite_member(invite(org.id)).await.unwrap();

    // The creator is already a member.
    let err = app
        .invitations()
        .process_invitation(&invitation.token, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyMember(_)));

    let stored = app.invitations().get_invitation(invitation.id).await.unwrap();
    assert_eq!(stored.status, InvitationStatus::Pending);
}

#[tokio::test]
async fn test_team_is_copied_to_membership() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let team = create_team(&app, org.id, "core", None).await;
    let manager = app.registry().get_role_by_name("manager", None).await.unwrap();

    let invitation = app
        .invitations()
        .invite_member(InviteRequest {
            team_id: Some(team.id),
            role_id: Some(manager.id),
            ..invite(org.id)
        })
        .await
        .unwrap();
    let membership = app
        .invitations()
        .process_invitation(&invitation.token, 77)
        .await
        .unwrap();
    assert_eq!(membership.team_id, Some(team.id));
    assert_eq!(membership.role_id, manager.id);

    assert!(app
        .resolver()
        .has_team_permission(77, team.id, "teams.update")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_invite_validation() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let other = create_organization(&app, "globex", 1).await;
    let foreign_team = create_team(&app, other.id, "core", None).await;

    let bad_email = app
        .invitations()
        .invite_member(InviteRequest {
            email: "not-an-email".to_string(),
            ..invite(org.id)
        })
        .await;
    assert!(bad_email.is_err());

    let no_org = app.invitations().invite_member(invite(999_999)).await;
    assert!(matches!(no_org, Err(AppError::OrganizationNotFound(_))));

    let no_role = app
        .invitations()
        .invite_member(InviteRequest {
            role_id: Some(999_999),
            ..invite(org.id)
        })
        .await;
    assert!(matches!(no_role, Err(AppError::RoleNotFound(_))));

    let wrong_team = app
        .invitations()
        .invite_member(InviteRequest {
            team_id: Some(foreign_team.id),
            ..invite(org.id)
        })
        .await;
    assert!(matches!(wrong_team, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn test_cancel_invitation() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let invitation = app.invitations().invite_member(invite(org.id)).await.unwrap();

    let cancelled = app.invitations().cancel_invitation(invitation.id).await.unwrap();
    assert_eq!(cancelled.status, InvitationStatus::Rejected);

    let again = app.invitations().cancel_invitation(invitation.id).await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));

    let accept = app.invitations().process_invitation(&invitation.token, 77).await;
    assert!(matches!(accept, Err(AppError::AlreadyProcessed(_))));
}

#[tokio::test]
async fn test_late_status_write_cannot_override_acceptance() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let invitation = app.invitations().invite_member(invite(org.id)).await.unwrap();

    // A canceller that read the invitation while it was still pending.
    let seen = app.invitations().get_invitation(invitation.id).await.unwrap();
    assert_eq!(seen.status, InvitationStatus::Pending);

    app.invitations()
        .process_invitation(&invitation.token, 77)
        .await
        .unwrap();

    let late = app
        .store
        .resolve_pending_invitation(seen.id, InvitationStatus::Rejected)
        .await
        .unwrap();
    assert!(late.is_none());

    let stored = app.invitations().get_invitation(invitation.id).await.unwrap();
    assert_eq!(stored.status, InvitationStatus::Accepted);
    assert!(app.memberships().get_member(org.id, 77).await.unwrap().is_active());

    let cancel = app.invitations().cancel_invitation(invitation.id).await;
    assert!(matches!(cancel, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn test_list_invitations_by_status() {
    let app = setup_test_app().await;
    let org = create_organization(&app, "acme", 1).await;
    let first = app.invitations().invite_member(invite(org.id)).await.unwrap();
    app.invitations()
        .invite_member(InviteRequest {
            email: "bob@example.com".to_string(),
            ..invite(org.id)
        })
        .await
        .unwrap();
    app.invitations().cancel_invitation(first.id).await.unwrap();

    let all = app.invitations().list_invitations(org.id, None).await.unwrap();
    assert_eq!(all.len(), 2);
    let pending = app
        .invitations()
        .list_invitations(org.id, Some(InvitationStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].email, "bob@example.com");
}

#[derive(Default)]
struct RecordingNotifier {
    tokens: Mutex<Vec<String>>,
}

#[async_trait]
impl InvitationNotifier for RecordingNotifier {
    async fn invitation_created(&self, invitation: &Invitation) -> Result<(), String> {
        self.tokens.lock().unwrap().push(invitation.token.clone());
        Err("smtp unavailable".to_string())
    }
}

#[tokio::test]
async fn test_notifier_receives_token_and_failure_is_tolerated() {
    let base = setup_test_app().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let app = TestApp {
        gatehouse: Gatehouse::with_parts(
            Arc::new(base.store.clone()),
            GatehouseConfig {
                invitation_ttl_days: 2,
                ..GatehouseConfig::default()
            },
            base.clock.clone(),
            notifier.clone(),
        ),
        store: base.store.clone(),
        clock: base.clock.clone(),
    };
    let org = create_organization(&app, "acme", 1).await;

    let invitation = app.invitations().invite_member(invite(org.id)).await.unwrap();
    assert_eq!(*notifier.tokens.lock().unwrap(), vec![invitation.token.clone()]);
    assert_eq!(invitation.expires_at, app.clock.now() + Duration::days(2));
}
