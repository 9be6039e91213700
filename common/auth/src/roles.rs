use serde::{Deserialize, Serialize};

pub const ROLE_OWNER: &str = "owner";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_AUTHOR: &str = "author";
pub const ROLE_VIEWER: &str = "viewer";

/// One of the four roles named in the data model (§3). `owner` and `admin`
/// are the only roles with dedicated authorization rules in the engine;
/// `author` and `viewer` exist for the mobile client's collaborator UI but
/// carry no special server-side privilege beyond plain ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Author,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => ROLE_OWNER,
            Role::Admin => ROLE_ADMIN,
            Role::Author => ROLE_AUTHOR,
            Role::Viewer => ROLE_VIEWER,
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            ROLE_OWNER => Some(Role::Owner),
            ROLE_ADMIN => Some(Role::Admin),
            ROLE_AUTHOR => Some(Role::Author),
            ROLE_VIEWER => Some(Role::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
