//! Hooks for out-of-band delivery
//!
//! Invitation tokens leave the system through an [`InvitationNotifier`]. The
//! embedding application implements it (email, chat, ...); the default does
//! nothing.

use async_trait::async_trait;
use gatehouse_core::models::Invitation;

/// Receives every newly created invitation, token included.
#[async_trait]
pub trait InvitationNotifier: Send + Sync {
    /// Deliver the invitation. A failure is logged and does not undo the
    /// invitation.
    async fn invitation_created(&self, invitation: &Invitation) -> Result<(), String>;
}

/// Notifier used when delivery is handled elsewhere.
pub struct NoOpInvitationNotifier;

#[async_trait]
impl InvitationNotifier for NoOpInvitationNotifier {
    async fn invitation_created(&self, _invitation: &Invitation) -> Result<(), String> {
        Ok(())
    }
}
