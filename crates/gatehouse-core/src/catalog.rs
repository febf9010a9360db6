//! Built-in catalog: system permissions, system roles and the organization role
//! templates seeded on first start.

use crate::models::{NewPermission, NewRole, WILDCARD_PERMISSION};

pub const SUPER_ADMIN: &str = "super_admin";
pub const ADMIN: &str = "admin";
pub const MODERATOR: &str = "moderator";
pub const USER: &str = "user";

/// Resources covered by the CRUD system permissions, with their category.
const RESOURCES: &[(&str, &str, &str)] = &[
    ("users", "User", "user_management"),
    ("organizations", "Organization", "organization_management"),
    ("teams", "Team", "organization_management"),
    ("members", "Member", "organization_management"),
    ("roles", "Role", "access_control"),
    ("permissions", "Permission", "access_control"),
];

const ACTIONS: &[(&str, &str)] = &[
    ("create", "Create"),
    ("read", "Read"),
    ("update", "Update"),
    ("delete", "Delete"),
];

pub struct SystemRole {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub level: i32,
    pub grants: &'static [&'static str],
}

pub const SYSTEM_ROLES: &[SystemRole] = &[
    SystemRole {
        name: SUPER_ADMIN,
        display_name: "Super Administrator",
        description: "Full access to every organization and team",
        level: 1000,
        grants: &[WILDCARD_PERMISSION],
    },
    SystemRole {
        name: ADMIN,
        display_name: "Administrator",
        description: "Full administrative access",
        level: 900,
        grants: &[WILDCARD_PERMISSION],
    },
    SystemRole {
        name: MODERATOR,
        display_name: "Moderator",
        description: "Read access everywhere and user moderation",
        level: 500,
        grants: &[
            "users.read",
            "users.update",
            "organizations.read",
            "teams.read",
            "members.read",
            "roles.read",
            "permissions.read",
        ],
    },
    SystemRole {
        name: USER,
        display_name: "User",
        description: "Basic signed-in user",
        level: 100,
        grants: &["users.read", "organizations.read", "teams.read"],
    },
];

/// Organization role template expressed in the legacy permission-map format.
pub struct RoleTemplate {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub level: i32,
    pub is_default: bool,
    pub permission_map: &'static str,
}

pub const ROLE_TEMPLATES: &[RoleTemplate] = &[
    RoleTemplate {
        name: "owner",
        display_name: "Owner",
        description: "Owns the organization",
        level: 800,
        is_default: false,
        permission_map: r#"{"*": true}"#,
    },
    RoleTemplate {
        name: "manager",
        display_name: "Manager",
        description: "Manages teams and members",
        level: 400,
        is_default: false,
        permission_map: r#"{
            "organizations.read": true,
            "teams.create": true,
            "teams.read": true,
            "teams.update": true,
            "members.create": true,
            "members.read": true,
            "members.update": true
        }"#,
    },
    RoleTemplate {
        name: "member",
        display_name: "Member",
        description: "Regular organization member",
        level: 100,
        is_default: true,
        permission_map: r#"{"organizations.read": true, "teams.read": true, "members.read": true}"#,
    },
];

/// The wildcard sentinel row.
pub fn wildcard_permission() -> NewPermission {
    NewPermission {
        name: WILDCARD_PERMISSION.to_string(),
        display_name: "All permissions".to_string(),
        description: Some("Grants every permission".to_string()),
        resource: "*".to_string(),
        action: "*".to_string(),
        category: "system".to_string(),
    }
}

/// Every system permission, wildcard first.
pub fn system_permissions() -> Vec<NewPermission> {
    let mut permissions = vec![wildcard_permission()];
    for (resource, label, category) in RESOURCES {
        for (action, verb) in ACTIONS {
            permissions.push(NewPermission {
                name: format!("{resource}.{action}"),
                display_name: format!("{verb} {label}"),
                description: Some(format!("{verb} {}", resource.replace('_', " "))),
                resource: resource.to_string(),
                action: action.to_string(),
                category: category.to_string(),
            });
        }
    }
    permissions
}

impl SystemRole {
    pub fn to_new_role(&self) -> NewRole {
        NewRole {
            name: self.name.to_string(),
            display_name: self.display_name.to_string(),
            description: Some(self.description.to_string()),
            organization_id: None,
            level: self.level,
            is_default: false,
        }
    }
}

impl RoleTemplate {
    pub fn to_new_role(&self) -> NewRole {
        NewRole {
            name: self.name.to_string(),
            display_name: self.display_name.to_string(),
            description: Some(self.description.to_string()),
            organization_id: None,
            level: self.level,
            is_default: self.is_default,
        }
    }
}
