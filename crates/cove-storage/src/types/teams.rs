use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{TeamId, UserId};

/// Role of a member within a team.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    /// Team creator and any promoted member.
    Admin,
    Member,
}

impl std::fmt::Display for TeamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TeamRole::Admin => "admin",
            TeamRole::Member => "member",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TeamRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(TeamRole::Admin),
            "member" => Ok(TeamRole::Member),
            _ => Err(format!("unknown team role: {}", s)),
        }
    }
}

/// Team record.
///
/// `environments` is an ordered list: insertion order is display order.
/// Names are unique within the team (enforced by the registry, not here).
#[derive(Clone, Debug)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// 8 uppercase hex chars, unique across all teams.
    pub join_code: String,
    /// Hash of the join password (`cove-crypto` salted format).
    pub password_hash: String,
    pub owner_id: UserId,
    pub environments: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a team.
#[derive(Clone, Debug)]
pub struct CreateTeamParams {
    pub name: String,
    pub join_code: String,
    pub password_hash: String,
    pub owner_id: UserId,
    pub environments: Vec<String>,
}

/// Partial team update; `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct TeamUpdate {
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub join_code: Option<String>,
    pub environments: Option<Vec<String>>,
}
