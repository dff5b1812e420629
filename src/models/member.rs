use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Identifier of the member's user account
    pub user_id: String,
    /// Role inside the project
    pub role: Role,
    /// When the user joined the project
    pub joined_at: Timestamp,
    /// Name shown on the board, when the server reports one
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    #[default]
    User,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown member role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "editor" => Ok(Role::Editor),
            "user" | "member" | "viewer" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

// Servers disagree on casing ("owner", "Owner", "OWNER").
impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Owner => "owner",
            Role::Editor => "editor",
            Role::User => "user",
        };
        f.write_str(name)
    }
}

impl Role {
    /// Whether a member holding `self` may remove a member holding `target`.
    ///
    /// Removing oneself is always allowed here; the sole-owner rule is
    /// checked separately since it depends on the whole member list.
    pub fn can_remove(self, target: Role, is_self: bool) -> bool {
        if is_self {
            return true;
        }
        match self {
            Role::Owner => target != Role::Owner,
            Role::Editor => target == Role::User,
            Role::User => false,
        }
    }

    pub fn can_change_roles(self) -> bool {
        self == Role::Owner
    }
}

pub fn owner_count(members: &[Member]) -> usize {
    members.iter().filter(|m| m.role == Role::Owner).count()
}
