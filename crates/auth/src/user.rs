//! Signed-in user profile.

use serde::{Deserialize, Serialize};

use hivegate_core::UserId;

use crate::Role;

/// User account as seen by the client.
///
/// The role is read-only from the holder's point of view; it changes only
/// through an administrative role update on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub email: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
