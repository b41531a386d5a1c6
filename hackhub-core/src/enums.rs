//! Enum types for HackHub

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Privilege level carried in a user's identity claims.
///
/// Each level doubles as an RBAC role name (`PARTICIPANT`, `VOLUNTEER`, ...).
/// Levels are declared lowest to highest; the ordering is informational only,
/// actual grants come from the role registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthLevel {
    Participant,
    Volunteer,
    TeamMember,
    Director,
    Technology,
    Finance,
}

impl AuthLevel {
    pub const ALL: [AuthLevel; 6] = [
        AuthLevel::Participant,
        AuthLevel::Volunteer,
        AuthLevel::TeamMember,
        AuthLevel::Director,
        AuthLevel::Technology,
        AuthLevel::Finance,
    ];

    /// Role name used in the RBAC registry.
    pub fn role_name(&self) -> &'static str {
        match self {
            AuthLevel::Participant => "PARTICIPANT",
            AuthLevel::Volunteer => "VOLUNTEER",
            AuthLevel::TeamMember => "TEAM_MEMBER",
            AuthLevel::Director => "DIRECTOR",
            AuthLevel::Technology => "TECHNOLOGY",
            AuthLevel::Finance => "FINANCE",
        }
    }

    /// Numeric privilege as stored in identity claims.
    pub fn from_privilege(value: i64) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role_name())
    }
}

impl FromStr for AuthLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.role_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown auth level: {}", s))
    }
}
