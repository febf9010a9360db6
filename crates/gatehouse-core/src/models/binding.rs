use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::Role;

/// Where a role binding applies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum BindingScope {
    Global,
    Organization(i64),
    Team(i64),
}

impl BindingScope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            BindingScope::Global => ScopeKind::Global,
            BindingScope::Organization(_) => ScopeKind::Organization,
            BindingScope::Team(_) => ScopeKind::Team,
        }
    }

    /// The organization or team id, `None` for global bindings.
    pub fn scope_id(&self) -> Option<i64> {
        match self {
            BindingScope::Global => None,
            BindingScope::Organization(id) | BindingScope::Team(id) => Some(*id),
        }
    }

    pub fn from_parts(kind: ScopeKind, scope_id: Option<i64>) -> Option<Self> {
        match (kind, scope_id) {
            (ScopeKind::Global, _) => Some(BindingScope::Global),
            (ScopeKind::Organization, Some(id)) => Some(BindingScope::Organization(id)),
            (ScopeKind::Team, Some(id)) => Some(BindingScope::Team(id)),
            _ => None,
        }
    }
}

impl std::fmt::Display for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingScope::Global => write!(f, "global"),
            BindingScope::Organization(id) => write!(f, "organization {id}"),
            BindingScope::Team(id) => write!(f, "team {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Global,
    Organization,
    Team,
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 3] = [ScopeKind::Global, ScopeKind::Organization, ScopeKind::Team];
}

/// Grant of a role to a user at a scope. Only live bindings (active and not
/// past `expires_at`) take part in resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleBinding {
    pub id: i64,
    pub user_id: i64,
    pub role_id: i64,
    pub scope: BindingScope,
    pub assigned_by: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleBinding {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindRequest {
    pub user_id: i64,
    pub role_id: i64,
    pub scope: BindingScope,
    pub assigned_by: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A live binding paired with its role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundRole {
    pub binding: RoleBinding,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn binding(expires_at: Option<DateTime<Utc>>, is_active: bool) -> RoleBinding {
        let now = Utc::now();
        RoleBinding {
            id: 1,
            user_id: 10,
            role_id: 20,
            scope: BindingScope::Organization(3),
            assigned_by: None,
            expires_at,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn liveness_honors_expiry_and_flag() {
        let now = Utc::now();
        assert!(binding(None, true).is_live(now));
        assert!(binding(Some(now + Duration::hours(1)), true).is_live(now));
        assert!(!binding(Some(now - Duration::seconds(1)), true).is_live(now));
        assert!(!binding(Some(now), true).is_live(now));
        assert!(!binding(None, false).is_live(now));
    }

    #[test]
    fn scope_parts_round_trip() {
        for scope in [
            BindingScope::Global,
            BindingScope::Organization(4),
            BindingScope::Team(9),
        ] {
            assert_eq!(
                BindingScope::from_parts(scope.kind(), scope.scope_id()),
                Some(scope)
            );
        }
        assert_eq!(BindingScope::from_parts(ScopeKind::Team, None), None);
    }

    #[test]
    fn scope_serializes_tagged() {
        let json = serde_json::to_value(BindingScope::Team(7)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "team", "id": 7}));
    }
}
