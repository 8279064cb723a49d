use chrono::{DateTime, Utc};

use super::ids::{ProjectId, TeamId};

/// Project record, scoped strictly to one team.
#[derive(Clone, Debug)]
pub struct Project {
    pub id: ProjectId,
    pub team_id: TeamId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a project.
#[derive(Clone, Debug)]
pub struct CreateProjectParams {
    pub team_id: TeamId,
    pub name: String,
}
