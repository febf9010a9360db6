//! Gatehouse storage
//!
//! The [`AuthzStore`] seam plus two adapters: PostgreSQL (feature `postgres`)
//! and an in-memory store.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod store;

pub use memory::MemoryAuthzStore;
#[cfg(feature = "postgres")]
pub use postgres::PgAuthzStore;
pub use store::{
    AuthzStore, AuthzTransaction, BindingStore, InvitationStore, MembershipStore,
    OrganizationStore, PermissionStore, RoleStore, TeamStore,
};

/// All storage traits, for callers that invoke store methods directly.
pub mod prelude {
    pub use crate::store::{
        AuthzStore, AuthzTransaction, BindingStore, InvitationStore, MembershipStore,
        OrganizationStore, PermissionStore, RoleStore, TeamStore,
    };
}
