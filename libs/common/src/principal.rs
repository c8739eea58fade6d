//! Authenticated principals, roles and the authorization policy

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role stored on the user record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The acting, authenticated identity behind a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create, edit, publish and delete articles and careers
    ManageContent,
    /// Read drafts through the admin listing
    ViewDrafts,
}

/// Role-based policy with a single seeded admin identity.
///
/// The configured admin email always evaluates as [`Role::Admin`], whatever
/// role is stored on the account.
#[derive(Debug, Clone)]
pub struct Policy {
    admin_email: String,
}

impl Policy {
    pub fn new(admin_email: impl AsRef<str>) -> Self {
        Self {
            admin_email: normalize_email(admin_email.as_ref()),
        }
    }

    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    /// Role used for decisions about `principal`
    pub fn effective_role(&self, principal: &Principal) -> Role {
        if self.is_admin_email(&principal.email) {
            Role::Admin
        } else {
            principal.role
        }
    }

    /// Whether the given email is the seeded admin address
    pub fn is_admin_email(&self, email: &str) -> bool {
        !self.admin_email.is_empty() && normalize_email(email) == self.admin_email
    }

    pub fn allows(&self, principal: &Principal, action: Action) -> bool {
        match (self.effective_role(principal), action) {
            (Role::Admin, _) => true,
            (Role::Editor, Action::ViewDrafts) => true,
            (Role::Editor, Action::ManageContent) => false,
            (Role::Member, _) => false,
        }
    }
}

/// Lower-cased, trimmed form used for every email comparison
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(email: &str, role: Role) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            email: email.to_string(),
            name: "Someone".to_string(),
            role,
        }
    }

    #[test]
    fn test_admin_email_is_admin_regardless_of_stored_role() {
        let policy = Policy::new("Admin@Example.com");
        let p = principal("admin@example.com ", Role::Member);

        assert_eq!(policy.effective_role(&p), Role::Admin);
        assert!(policy.allows(&p, Action::ManageContent));
    }

    #[test]
    fn test_member_cannot_manage_content() {
        let policy = Policy::new("admin@example.com");
        let p = principal("staff@example.com", Role::Member);

        assert!(!policy.allows(&p, Action::ManageContent));
        assert!(!policy.allows(&p, Action::ViewDrafts));
    }

    #[test]
    fn test_editor_can_view_drafts_only() {
        let policy = Policy::new("admin@example.com");
        let p = principal("editor@example.com", Role::Editor);

        assert!(policy.allows(&p, Action::ViewDrafts));
        assert!(!policy.allows(&p, Action::ManageContent));
    }

    #[test]
    fn test_empty_admin_email_matches_nobody() {
        let policy = Policy::new("");
        assert!(!policy.is_admin_email(""));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("editor".parse::<Role>(), Ok(Role::Editor));
        assert!("root".parse::<Role>().is_err());
    }
}
