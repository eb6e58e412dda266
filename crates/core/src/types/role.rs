//! Application roles stored in `users.role`.

use serde::{Deserialize, Serialize};

/// Error returned when a role string is not one of the known roles.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid role: {0} (expected admin, editor or moderator)")]
pub struct RoleError(pub String);

/// Role of a back-office user.
///
/// The `users` table constrains the column to these three values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access to the back-office.
    Admin,
    /// Content editing (articles, videos).
    Editor,
    /// Citizen message moderation.
    Moderator,
}

impl Role {
    /// All roles, in the order the provisioning CLI lists them.
    pub const ALL: [Self; 3] = [Self::Admin, Self::Editor, Self::Moderator];

    /// Whether this role may complete an administrative session.
    ///
    /// Only administrators are admitted. Editors and moderators exist in the
    /// data model but are refused at sign-in.
    #[must_use]
    pub const fn may_enter_back_office(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// The value stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Moderator => "moderator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| RoleError(s.to_owned()))
    }
}
