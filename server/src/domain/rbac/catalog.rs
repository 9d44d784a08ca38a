//! Role catalog: role name -> permission set

use std::collections::{HashMap, HashSet};

use crate::core::constants::{
    DEFAULT_ADMIN_ROLE, PERMISSION_CREATE_CHILDREN, PERMISSION_DELETE, PERMISSION_READ,
    PERMISSION_READ_SECURITY, PERMISSION_WRITE, PERMISSION_WRITE_SECURITY, ROLE_NONE,
};

/// Process-wide roles definition, read-only after startup
#[derive(Debug, Clone)]
pub struct RoleCatalog {
    roles: HashMap<String, HashSet<String>>,
    admin_role: String,
}

impl Default for RoleCatalog {
    fn default() -> Self {
        let admin = [
            PERMISSION_READ,
            PERMISSION_READ_SECURITY,
            PERMISSION_CREATE_CHILDREN,
            PERMISSION_WRITE,
            PERMISSION_WRITE_SECURITY,
            PERMISSION_DELETE,
        ];
        let editor = [
            PERMISSION_READ,
            PERMISSION_READ_SECURITY,
            PERMISSION_CREATE_CHILDREN,
            PERMISSION_WRITE,
        ];
        let user = [
            PERMISSION_READ,
            PERMISSION_READ_SECURITY,
            PERMISSION_CREATE_CHILDREN,
        ];
        let viewer = [PERMISSION_READ, PERMISSION_READ_SECURITY];

        let roles = [
            (DEFAULT_ADMIN_ROLE, &admin[..]),
            ("editor", &editor[..]),
            ("user", &user[..]),
            ("viewer", &viewer[..]),
            (ROLE_NONE, &[][..]),
        ]
        .into_iter()
        .map(|(role, perms)| {
            (
                role.to_string(),
                perms.iter().map(|p| p.to_string()).collect(),
            )
        })
        .collect();

        Self {
            roles,
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
        }
    }
}

impl RoleCatalog {
    pub fn new<I, P>(roles: I, admin_role: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (String, P)>,
        P: IntoIterator<Item = String>,
    {
        Self {
            roles: roles
                .into_iter()
                .map(|(role, perms)| (role, perms.into_iter().collect()))
                .collect(),
            admin_role: admin_role.into(),
        }
    }

    /// Designate another role as the administrator role
    pub fn with_admin_role(mut self, admin_role: impl Into<String>) -> Self {
        self.admin_role = admin_role.into();
        self
    }

    /// Permissions granted by `role`; unknown roles grant nothing
    pub fn permissions_of(&self, role: &str) -> HashSet<String> {
        self.roles.get(role).cloned().unwrap_or_default()
    }

    /// Borrowing lookup used on the decision path
    pub fn grants(&self, role: &str, permission: &str) -> bool {
        self.roles
            .get(role)
            .is_some_and(|perms| perms.contains(permission))
    }

    /// Exact name match against the configured admin role, regardless of
    /// the permissions listed for it
    pub fn is_admin_role(&self, role: &str) -> bool {
        role == self.admin_role
    }

    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    /// Known to the catalog or the reserved "none" role
    pub fn is_known(&self, role: &str) -> bool {
        role == ROLE_NONE || self.roles.contains_key(role)
    }

    /// Role names in stable order
    pub fn role_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
