//! Application-level user record.

use serde::{Deserialize, Serialize};

use super::{Email, ProfileId, Role};

/// A row of the `users` table.
///
/// The id is the same UUID the auth provider issued for the matching
/// identity. An identity without a profile is not an application user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Shared primary key with the auth identity.
    pub id: ProfileId,
    /// Contact email (normally equal to the identity's login email).
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Back-office role.
    pub role: Role,
}

impl Profile {
    /// Columns selected when resolving a profile.
    pub const COLUMNS: &'static str = "id,email,role,name";

    /// Table holding profiles.
    pub const TABLE: &'static str = "users";

    /// Name to show in the UI: the display name, or the email when the name is blank.
    #[must_use]
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() {
            self.email.as_str()
        } else {
            name
        }
    }
}
