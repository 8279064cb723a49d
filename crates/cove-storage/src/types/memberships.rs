use chrono::{DateTime, Utc};

use super::ids::{TeamId, UserId};
use super::teams::TeamRole;

/// Links one user to one team.
///
/// A user holds at most one membership at a time; backends enforce this
/// with a uniqueness constraint on the user id.
#[derive(Clone, Debug)]
pub struct Membership {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub role: TeamRole,
    /// Gates export and unmasking for non-admins. Admins always have
    /// download permission regardless of this flag.
    pub can_download: bool,
    pub title: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// Parameters for creating a membership.
#[derive(Clone, Debug)]
pub struct CreateMembershipParams {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub role: TeamRole,
    pub can_download: bool,
    pub title: Option<String>,
}

/// Partial membership update; `None` fields are left untouched.
#[derive(Clone, Debug, Default)]
pub struct MembershipUpdate {
    pub role: Option<TeamRole>,
    pub can_download: Option<bool>,
}
