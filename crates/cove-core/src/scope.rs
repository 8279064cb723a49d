//! Membership and project scope resolution shared by the services.

use cove_storage::{Membership, Project, ProjectId, Store, StoreError, TeamId, UserId};

use crate::error::CoreError;

/// The caller's membership, wherever their team is. No membership is
/// `Forbidden`: the caller is authenticated but has no team to act in.
pub(crate) async fn require_membership(
    store: &dyn Store,
    user_id: &UserId,
) -> Result<Membership, CoreError> {
    store
        .membership_of(user_id)
        .await?
        .ok_or(CoreError::Forbidden("no team membership"))
}

/// The caller's membership in a specific team.
pub(crate) async fn require_team_member(
    store: &dyn Store,
    team_id: &TeamId,
    user_id: &UserId,
) -> Result<Membership, CoreError> {
    match store.get_membership(team_id, user_id).await {
        Ok(membership) => Ok(membership),
        Err(StoreError::NotFound) => Err(CoreError::Forbidden("not a member of this team")),
        Err(e) => Err(e.into()),
    }
}

/// A project, provided it belongs to the caller's team. Out-of-scope and
/// absent are the same `NotFound`.
pub(crate) async fn project_in_team(
    store: &dyn Store,
    project_id: &ProjectId,
    team_id: &TeamId,
) -> Result<Project, CoreError> {
    let project = store.get_project(project_id).await?;
    if project.team_id != *team_id {
        return Err(CoreError::NotFound);
    }
    Ok(project)
}
