// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles for authorization.
///
/// ## Membership, not hierarchy
///
/// Roles are a closed set with no ordering. A gate lists every role it
/// accepts; `Admin` does not implicitly satisfy a `User`-only gate.
///
/// - `Admin` - Administrative endpoints
/// - `User` - Regular authenticated user (default for new identities)
/// - `Staff` - Internal staff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrative access
    Admin,
    /// Regular user; new identities get this unless a role is supplied
    #[default]
    User,
    /// Internal staff
    Staff,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 3] = [Role::Admin, Role::User, Role::Staff];

    /// Canonical wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Staff => "staff",
        }
    }

    /// Parse a role from its exact wire name.
    ///
    /// Matching is case-sensitive: `"Admin"` is not a role.
    pub fn parse(s: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.as_str() == s)
    }

    /// Check whether this role is one of `allowed`.
    pub fn is_member_of(&self, allowed: &[Role]) -> bool {
        allowed.contains(self)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_does_not_satisfy_user_gate() {
        assert!(!Role::Admin.is_member_of(&[Role::User]));
        assert!(Role::Admin.is_member_of(&[Role::Admin, Role::Staff]));
        assert!(!Role::Staff.is_member_of(&[]));
    }

    #[test]
    fn parse_is_exact() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("staff"), Some(Role::Staff));
        assert_eq!(Role::parse("ADMIN"), None);
        assert_eq!(Role::parse(" admin"), None);
        assert_eq!(Role::parse("client"), None);
    }

    #[test]
    fn default_role_is_user() {
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Role::Staff).unwrap(), r#""staff""#);
        let role: Role = serde_json::from_str(r#""admin""#).unwrap();
        assert_eq!(role, Role::Admin);
    }
}
